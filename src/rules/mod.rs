//! Rule declarations, compilation, and evaluation.
//!
//! Access control is declared as a nested tree of rules mirroring the
//! document shape ([`Declaration`]), compiled once per collection into a
//! flat path-keyed [`RuleTable`], and evaluated per request against a
//! [`RuleContext`] snapshot of the call.
//!
//! The security posture is **default-allow for ungoverned paths**: a path
//! with no rule of a given kind is readable and writable unless an ancestor
//! or root rule denies. Deny-by-default is expressed by declaring a root
//! rule, never by a hidden default.

mod context;
mod declaration;
mod eval;
mod rule;
mod table;

pub mod config;

pub use context::RuleContext;
pub use declaration::Declaration;
pub use eval::evaluate;
pub use rule::{Rule, RuleKind};
pub use table::{RuleTable, ROOT};

use thiserror::Error;

/// Rule compilation error types.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid rule expression: {0}")]
    InvalidExpression(String),

    #[error("invalid claim pattern: {0}")]
    Pattern(#[from] regex::Error),
}
