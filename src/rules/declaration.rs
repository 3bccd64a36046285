//! Nested rule declarations.

use std::collections::BTreeMap;

use super::rule::Rule;

/// A nested rule declaration mirroring a document's shape.
///
/// Each level optionally carries `read` and `write` rules for the field at
/// that level, named method/static rules, and child declarations for
/// nested fields. Authored once per collection and immutable after compile.
///
/// ```
/// use fieldgate::rules::{Declaration, Rule};
///
/// let rules = Declaration::new()
///     .read(Rule::allow())
///     .field("secret", Declaration::new().read(Rule::deny()))
///     .method("promote", Rule::when(|ctx| ctx.claim_str("role") == Some("admin")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Declaration {
    pub(crate) read: Option<Rule>,
    pub(crate) write: Option<Rule>,
    pub(crate) fields: BTreeMap<String, Declaration>,
    pub(crate) methods: BTreeMap<String, Rule>,
    pub(crate) statics: BTreeMap<String, Rule>,
}

impl Declaration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the read rule for this level.
    pub fn read(mut self, rule: Rule) -> Self {
        self.read = Some(rule);
        self
    }

    /// Set the write rule for this level.
    pub fn write(mut self, rule: Rule) -> Self {
        self.write = Some(rule);
        self
    }

    /// Declare rules for a nested field.
    pub fn field(mut self, name: impl Into<String>, declaration: Declaration) -> Self {
        self.fields.insert(name.into(), declaration);
        self
    }

    /// Declare the rule guarding a named method.
    pub fn method(mut self, name: impl Into<String>, rule: Rule) -> Self {
        self.methods.insert(name.into(), rule);
        self
    }

    /// Declare the rule guarding a named static operation.
    pub fn static_op(mut self, name: impl Into<String>, rule: Rule) -> Self {
        self.statics.insert(name.into(), rule);
        self
    }
}
