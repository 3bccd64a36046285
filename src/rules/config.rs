//! Declarative rule expressions.
//!
//! Collections declared in the config file author their rules as data:
//! a literal verdict or a tagged expression over the evaluation context.
//! Expressions compile at load time into the same [`Rule`] values the
//! code-level API produces, so a YAML-declared collection and a
//! code-registered one behave identically.

use chrono::Timelike;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document;

use super::context::RuleContext;
use super::declaration::Declaration;
use super::rule::{PredicateFn, Rule};
use super::RuleError;

/// A declarative rule: a bare boolean or an expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleConfig {
    Literal(bool),
    Expr(ExprConfig),
}

/// Expression over the evaluation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExprConfig {
    /// Caller has any claims at all.
    Authenticated,
    /// A caller claim equals a value.
    ClaimEquals { claim: String, value: Value },
    /// A caller claim is one of a set of values.
    ClaimIn { claim: String, values: Vec<Value> },
    /// A string caller claim matches a regex.
    ClaimMatches { claim: String, pattern: String },
    /// The field value under test equals a value.
    ValueEquals { value: Value },
    /// A document field (dotted path) equals a value.
    DocumentFieldEquals { path: String, value: Value },
    /// Current UTC time falls inside a window (HH:MM, may cross midnight).
    TimeWindow { start: String, end: String },
    /// Negate an expression.
    Not { rule: Box<ExprConfig> },
    /// All expressions must pass.
    And { rules: Vec<ExprConfig> },
    /// Any expression must pass.
    Or { rules: Vec<ExprConfig> },
}

impl RuleConfig {
    /// Compile into an evaluatable rule.
    pub fn compile(&self) -> Result<Rule, RuleError> {
        match self {
            RuleConfig::Literal(verdict) => Ok(Rule::Allow(*verdict)),
            RuleConfig::Expr(expr) => Ok(Rule::Predicate(compile_expr(expr)?.into())),
        }
    }
}

fn compile_expr(expr: &ExprConfig) -> Result<Box<PredicateFn>, RuleError> {
    match expr {
        ExprConfig::Authenticated => Ok(Box::new(|ctx: &RuleContext| ctx.is_authenticated())),
        ExprConfig::ClaimEquals { claim, value } => {
            let claim = claim.clone();
            let value = value.clone();
            Ok(Box::new(move |ctx: &RuleContext| {
                ctx.claim(&claim) == Some(&value)
            }))
        }
        ExprConfig::ClaimIn { claim, values } => {
            let claim = claim.clone();
            let values = values.clone();
            Ok(Box::new(move |ctx: &RuleContext| {
                ctx.claim(&claim).map(|v| values.contains(v)).unwrap_or(false)
            }))
        }
        ExprConfig::ClaimMatches { claim, pattern } => {
            let claim = claim.clone();
            let pattern = Regex::new(pattern)?;
            Ok(Box::new(move |ctx: &RuleContext| {
                ctx.claim_str(&claim)
                    .map(|s| pattern.is_match(s))
                    .unwrap_or(false)
            }))
        }
        ExprConfig::ValueEquals { value } => {
            let value = value.clone();
            Ok(Box::new(move |ctx: &RuleContext| ctx.value() == &value))
        }
        ExprConfig::DocumentFieldEquals { path, value } => {
            let path = path.clone();
            let value = value.clone();
            Ok(Box::new(move |ctx: &RuleContext| {
                document::deep_value(ctx.document(), &path) == Some(&value)
            }))
        }
        ExprConfig::TimeWindow { start, end } => {
            let (start_hour, start_min) = parse_time(start)?;
            let (end_hour, end_min) = parse_time(end)?;
            let start_minutes = start_hour * 60 + start_min;
            let end_minutes = end_hour * 60 + end_min;
            Ok(Box::new(move |_ctx: &RuleContext| {
                let now = chrono::Utc::now();
                let current = now.hour() * 60 + now.minute();
                if start_minutes <= end_minutes {
                    current >= start_minutes && current <= end_minutes
                } else {
                    // Crosses midnight
                    current >= start_minutes || current <= end_minutes
                }
            }))
        }
        ExprConfig::Not { rule } => {
            let inner = compile_expr(rule)?;
            Ok(Box::new(move |ctx: &RuleContext| !inner(ctx)))
        }
        ExprConfig::And { rules } => {
            let compiled = rules
                .iter()
                .map(compile_expr)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Box::new(move |ctx: &RuleContext| {
                compiled.iter().all(|rule| rule(ctx))
            }))
        }
        ExprConfig::Or { rules } => {
            let compiled = rules
                .iter()
                .map(compile_expr)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Box::new(move |ctx: &RuleContext| {
                compiled.iter().any(|rule| rule(ctx))
            }))
        }
    }
}

fn parse_time(time_str: &str) -> Result<(u32, u32), RuleError> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 2 {
        return Err(RuleError::InvalidExpression(format!(
            "invalid time format: {time_str}"
        )));
    }
    let hour: u32 = parts[0]
        .parse()
        .map_err(|_| RuleError::InvalidExpression(format!("invalid hour: {}", parts[0])))?;
    let minute: u32 = parts[1]
        .parse()
        .map_err(|_| RuleError::InvalidExpression(format!("invalid minute: {}", parts[1])))?;
    if hour > 23 || minute > 59 {
        return Err(RuleError::InvalidExpression(format!(
            "time out of range: {time_str}"
        )));
    }
    Ok((hour, minute))
}

/// Declarative rule tree for one declaration level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleNodeConfig {
    /// Read rule for this level.
    #[serde(default)]
    pub read: Option<RuleConfig>,

    /// Write rule for this level.
    #[serde(default)]
    pub write: Option<RuleConfig>,

    /// Nested field declarations.
    #[serde(default)]
    pub fields: std::collections::BTreeMap<String, RuleNodeConfig>,

    /// Method rules (handlers are registered in code).
    #[serde(default)]
    pub methods: std::collections::BTreeMap<String, RuleConfig>,

    /// Static operation rules.
    #[serde(default)]
    pub statics: std::collections::BTreeMap<String, RuleConfig>,
}

impl RuleNodeConfig {
    /// Compile the whole tree into a declaration.
    pub fn compile(&self) -> Result<Declaration, RuleError> {
        let mut declaration = Declaration::new();
        if let Some(rule) = &self.read {
            declaration = declaration.read(rule.compile()?);
        }
        if let Some(rule) = &self.write {
            declaration = declaration.write(rule.compile()?);
        }
        for (name, rule) in &self.methods {
            declaration = declaration.method(name.clone(), rule.compile()?);
        }
        for (name, rule) in &self.statics {
            declaration = declaration.static_op(name.clone(), rule.compile()?);
        }
        for (name, child) in &self.fields {
            declaration = declaration.field(name.clone(), child.compile()?);
        }
        Ok(declaration)
    }
}
