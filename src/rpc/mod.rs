//! Wire types for the RPC surface.
//!
//! Requests address a dotted target path (`users.document`,
//! `users.method.promote`, `auth.token`) with a positional argument list;
//! responses carry either a result or a structured error with a stable
//! kind.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::CallError;

/// Maximum accepted line length for a single request frame.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// An inbound call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Caller-chosen correlation id, echoed in the response.
    pub id: u64,

    /// Dotted target path.
    pub target: String,

    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
}

/// An outbound reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Structured failure reported to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error kind (`permission_denied`, `not_found`, ...).
    pub kind: String,

    /// Human-readable message.
    pub message: String,
}

impl Response {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorBody {
                kind: kind.into(),
                message: message.into(),
            }),
        }
    }

    pub fn from_result(id: u64, result: Result<Value, CallError>) -> Self {
        match result {
            Ok(value) => Self::ok(id, value),
            Err(error) => Self::error(id, error.kind(), error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A collection operation named on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Document,
    Save,
    Validate,
    Query,
    FindOne,
    Create,
    Method(String),
    Static(String),
}

impl Operation {
    pub fn name(&self) -> &str {
        match self {
            Operation::Document => "document",
            Operation::Save => "save",
            Operation::Validate => "validate",
            Operation::Query => "query",
            Operation::FindOne => "find_one",
            Operation::Create => "create",
            Operation::Method(name) => name,
            Operation::Static(name) => name,
        }
    }
}

/// A parsed request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Session authentication (`auth.token`).
    Auth,

    /// A collection operation.
    Call {
        collection: String,
        operation: Operation,
    },
}

/// Target parse error.
#[derive(Debug, Error)]
#[error("invalid target: {0}")]
pub struct TargetError(String);

impl Target {
    pub fn parse(target: &str) -> Result<Self, TargetError> {
        let segments: Vec<&str> = target.split('.').collect();

        let parsed = match segments.as_slice() {
            ["auth", "token"] => Target::Auth,
            [collection, operation] if !collection.is_empty() => {
                let operation = match *operation {
                    "document" | "read" => Operation::Document,
                    "save" | "write" => Operation::Save,
                    "validate" => Operation::Validate,
                    "query" | "find" => Operation::Query,
                    "find_one" => Operation::FindOne,
                    "create" => Operation::Create,
                    _ => return Err(TargetError(target.to_string())),
                };
                Target::Call {
                    collection: collection.to_string(),
                    operation,
                }
            }
            [collection, "method", name] if !collection.is_empty() && !name.is_empty() => {
                Target::Call {
                    collection: collection.to_string(),
                    operation: Operation::Method(name.to_string()),
                }
            }
            [collection, "static", name] if !collection.is_empty() && !name.is_empty() => {
                Target::Call {
                    collection: collection.to_string(),
                    operation: Operation::Static(name.to_string()),
                }
            }
            _ => return Err(TargetError(target.to_string())),
        };

        Ok(parsed)
    }
}
