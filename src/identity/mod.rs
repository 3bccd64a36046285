//! Caller identity and identity providers.
//!
//! An [`Identity`] is the opaque claim set attached to a connection after
//! authentication. The engine never interprets claims itself; rule
//! predicates read them through [`Identity::claim`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::IdentityConfig;

/// Authentication error types.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,

    #[error("identity provider error: {0}")]
    Provider(String),
}

/// The authenticated-or-anonymous caller attached to a connection.
///
/// Immutable once constructed; sessions swap the whole identity on
/// re-authentication rather than mutating it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    claims: Map<String, Value>,
}

impl Identity {
    /// An identity with no claims.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Build an identity from a JSON claim object.
    ///
    /// Non-object values (including `null`) yield an anonymous identity.
    pub fn from_claims(claims: Value) -> Self {
        match claims {
            Value::Object(claims) => Self { claims },
            _ => Self::anonymous(),
        }
    }

    /// Look up a claim by name.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Look up a string claim by name.
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    /// The subject claim, if present.
    pub fn subject(&self) -> Option<&str> {
        self.claim_str("sub")
    }

    pub fn is_anonymous(&self) -> bool {
        self.claims.is_empty()
    }
}

/// Resolves an opaque token to an identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Validate a token and return the identity it names.
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Shared identity provider handle.
pub type SharedProvider = Arc<dyn IdentityProvider>;

/// Token-to-identity map, loaded from configuration.
///
/// Suitable for development and testing; production deployments put a real
/// token verifier behind [`IdentityProvider`] instead.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the provider from the config's token list.
    pub fn from_config(config: &IdentityConfig) -> Self {
        let mut provider = Self::new();
        for entry in &config.tokens {
            provider.insert(&entry.token, Identity::from_claims(entry.claims.clone()));
        }
        provider
    }

    /// Register a token.
    pub fn insert(&mut self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        self.tokens.get(token).cloned().ok_or(AuthError::InvalidToken)
    }
}
