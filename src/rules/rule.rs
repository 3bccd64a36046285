//! The rule expression variants.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::context::RuleContext;

/// Synchronous predicate over the evaluation context.
pub type PredicateFn = dyn Fn(&RuleContext) -> bool + Send + Sync;

/// Asynchronous predicate; a rejected check denies.
pub type AsyncPredicateFn =
    dyn Fn(RuleContext) -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync;

/// The kinds of access a rule can govern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Read,
    Write,
    Method,
    Static,
}

impl RuleKind {
    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::Read => "read",
            RuleKind::Write => "write",
            RuleKind::Method => "method",
            RuleKind::Static => "static",
        }
    }
}

/// A single access rule: an enumerable predicate over the evaluation
/// context, not evaluable code.
///
/// Predicates must be side-effect-free as observed by the masker; nothing
/// is guaranteed about evaluation order between sibling paths.
#[derive(Clone)]
pub enum Rule {
    /// A literal verdict.
    Allow(bool),

    /// A pure predicate of `{identity, document, value, args}`.
    Predicate(Arc<PredicateFn>),

    /// A predicate whose check needs external data (e.g. a lookup).
    Async(Arc<AsyncPredicateFn>),
}

impl Rule {
    pub fn allow() -> Self {
        Rule::Allow(true)
    }

    pub fn deny() -> Self {
        Rule::Allow(false)
    }

    /// A rule from a synchronous predicate.
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(&RuleContext) -> bool + Send + Sync + 'static,
    {
        Rule::Predicate(Arc::new(predicate))
    }

    /// A rule from an asynchronous predicate.
    pub fn when_async<F>(predicate: F) -> Self
    where
        F: Fn(RuleContext) -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync + 'static,
    {
        Rule::Async(Arc::new(predicate))
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Allow(verdict) => write!(f, "Rule::Allow({verdict})"),
            Rule::Predicate(_) => write!(f, "Rule::Predicate"),
            Rule::Async(_) => write!(f, "Rule::Async"),
        }
    }
}
