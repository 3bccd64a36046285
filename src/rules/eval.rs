//! Rule evaluation.
//!
//! Every rule shape is normalized to an awaited boolean. A broken rule
//! (one that panics or whose asynchronous check fails) denies; it never
//! aborts the call chain.

use std::panic::{catch_unwind, AssertUnwindSafe};

use futures::FutureExt;
use tracing::debug;

use super::context::RuleContext;
use super::rule::Rule;

/// Evaluate a rule against a context.
///
/// A missing rule evaluates to `true`: this is the default-allow posture
/// for ungoverned paths, and it is security-relevant: only declared rules
/// can deny. Evaluations for independent paths may run concurrently; no
/// ordering between them is guaranteed.
pub async fn evaluate(rule: Option<&Rule>, ctx: &RuleContext) -> bool {
    match rule {
        None => true,
        Some(Rule::Allow(verdict)) => *verdict,
        Some(Rule::Predicate(predicate)) => {
            match catch_unwind(AssertUnwindSafe(|| predicate(ctx))) {
                Ok(verdict) => verdict,
                Err(_) => {
                    debug!("rule predicate panicked, denying");
                    false
                }
            }
        }
        Some(Rule::Async(predicate)) => {
            match AssertUnwindSafe(predicate(ctx.clone())).catch_unwind().await {
                Ok(Ok(verdict)) => verdict,
                Ok(Err(error)) => {
                    debug!(error = %error, "async rule check failed, denying");
                    false
                }
                Err(_) => {
                    debug!("async rule panicked, denying");
                    false
                }
            }
        }
    }
}
