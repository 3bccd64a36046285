//! Compiled rule tables.
//!
//! Flattens an arbitrarily nested [`Declaration`] into per-kind
//! `dotted path -> rule` maps, built once at collection registration and
//! read-only thereafter (safe for unsynchronized concurrent reads).

use std::collections::BTreeMap;

use super::declaration::Declaration;
use super::rule::{Rule, RuleKind};

/// Path sentinel for the declaration root. If the root rule of a kind
/// fails, the whole result collapses to denied rather than partial
/// redaction.
pub const ROOT: &str = "$";

/// Flat per-kind mapping from dotted field path to rule.
///
/// Paths are unique keys, so flattening order cannot matter; `BTreeMap`
/// keeps iteration stable and sorted for testability. A level's rule is
/// keyed by the level's own path; the rule-kind slot never becomes a path
/// segment, so a field literally named `read` stays addressable.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    read: BTreeMap<String, Rule>,
    write: BTreeMap<String, Rule>,
    methods: BTreeMap<String, Rule>,
    statics: BTreeMap<String, Rule>,
}

impl RuleTable {
    /// Compile a declaration into a flat table.
    pub fn compile(declaration: &Declaration) -> Self {
        let mut table = Self::default();
        table.flatten(ROOT, declaration);
        table
    }

    fn flatten(&mut self, path: &str, node: &Declaration) {
        if let Some(rule) = &node.read {
            self.read.insert(path.to_string(), rule.clone());
        }
        if let Some(rule) = &node.write {
            self.write.insert(path.to_string(), rule.clone());
        }
        for (name, rule) in &node.methods {
            self.methods.insert(Self::join(path, name), rule.clone());
        }
        for (name, rule) in &node.statics {
            self.statics.insert(Self::join(path, name), rule.clone());
        }
        for (name, child) in &node.fields {
            let child_path = Self::join(path, name);
            self.flatten(&child_path, child);
        }
    }

    fn join(path: &str, name: &str) -> String {
        if path == ROOT {
            name.to_string()
        } else {
            format!("{path}.{name}")
        }
    }

    /// All rules of a kind, keyed by path.
    pub fn rules_of(&self, kind: RuleKind) -> &BTreeMap<String, Rule> {
        match kind {
            RuleKind::Read => &self.read,
            RuleKind::Write => &self.write,
            RuleKind::Method => &self.methods,
            RuleKind::Static => &self.statics,
        }
    }

    /// The rule of a kind at an exact path, if declared.
    pub fn rule_at(&self, kind: RuleKind, path: &str) -> Option<&Rule> {
        self.rules_of(kind).get(path)
    }

    /// Total number of compiled rules across all kinds.
    pub fn len(&self) -> usize {
        self.read.len() + self.write.len() + self.methods.len() + self.statics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
