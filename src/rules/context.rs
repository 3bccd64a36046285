//! Rule evaluation context.
//!
//! The read-only per-call snapshot a rule predicate sees: the caller
//! identity, the candidate document, the field value under test, and the
//! raw call arguments.

use std::sync::Arc;

use serde_json::Value;

use crate::identity::Identity;

/// Context for rule evaluation.
///
/// Built fresh per path evaluation and exclusively owned by that
/// evaluation; rules cannot mutate it. Shared parts (identity, document,
/// args) are reference-counted so per-path contexts stay cheap.
#[derive(Debug, Clone)]
pub struct RuleContext {
    identity: Arc<Identity>,
    document: Arc<Value>,
    value: Value,
    args: Arc<Vec<Value>>,
}

impl RuleContext {
    /// Create a context for the given caller; document, value, and args
    /// default to empty.
    pub fn new(identity: Arc<Identity>) -> Self {
        Self {
            identity,
            document: Arc::new(Value::Null),
            value: Value::Null,
            args: Arc::new(Vec::new()),
        }
    }

    /// Set the full candidate document.
    pub fn with_document(mut self, document: Arc<Value>) -> Self {
        self.document = document;
        self
    }

    /// Set the specific field value under test.
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    /// Set the raw call argument list.
    pub fn with_args(mut self, args: Arc<Vec<Value>>) -> Self {
        self.args = args;
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Look up a caller claim.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.identity.claim(name)
    }

    /// Look up a string caller claim.
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.identity.claim_str(name)
    }

    pub fn is_authenticated(&self) -> bool {
        !self.identity.is_anonymous()
    }
}
