//! Document masking.
//!
//! Applies a compiled [`RuleTable`] across a document's rule-governed
//! paths to produce a redacted read view, or to strip disallowed fields
//! from an incoming write payload.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::trace;

use crate::document;
use crate::identity::Identity;
use crate::rules::{evaluate, RuleContext, RuleKind, RuleTable, ROOT};

/// The outcome of masking a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Masked {
    /// A full or partially redacted copy; removed paths leave the
    /// surrounding structure intact.
    Document(Value),

    /// The root rule failed; the whole document is withheld.
    Denied,
}

impl Masked {
    pub fn is_denied(&self) -> bool {
        matches!(self, Masked::Denied)
    }

    /// The masked document, or `None` when denied.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Masked::Document(value) => Some(value),
            Masked::Denied => None,
        }
    }
}

/// Applies rule tables to documents.
///
/// Holds only the shared compiled table; cheap to clone, safe to use from
/// any number of in-flight calls at once.
#[derive(Debug, Clone)]
pub struct DocumentMasker {
    table: Arc<RuleTable>,
}

impl DocumentMasker {
    pub fn new(table: Arc<RuleTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &Arc<RuleTable> {
        &self.table
    }

    /// Mask a document for the given caller.
    ///
    /// Only rule-governed paths are evaluated; ungoverned fields pass
    /// through untouched. The root rule, if declared, is evaluated first
    /// and short-circuits to [`Masked::Denied`] without any per-field
    /// evaluation. Remaining governed paths are evaluated concurrently, so
    /// total latency is bounded by the slowest rule, not their sum. The
    /// input document is never mutated.
    pub async fn mask(
        &self,
        identity: &Arc<Identity>,
        document: &Value,
        kind: RuleKind,
        args: &Arc<Vec<Value>>,
    ) -> Masked {
        let rules = self.table.rules_of(kind);
        if rules.is_empty() {
            return Masked::Document(document.clone());
        }

        let doc = Arc::new(document.clone());

        if let Some(root_rule) = rules.get(ROOT) {
            let ctx = RuleContext::new(identity.clone())
                .with_document(doc.clone())
                .with_value((*doc).clone())
                .with_args(args.clone());

            if !evaluate(Some(root_rule), &ctx).await {
                trace!(kind = kind.name(), "root rule denied");
                return Masked::Denied;
            }
        }

        let checks = rules
            .iter()
            .filter(|(path, _)| path.as_str() != ROOT)
            .map(|(path, rule)| {
                let value = document::deep_value(&doc, path)
                    .cloned()
                    .unwrap_or(Value::Null);
                let ctx = RuleContext::new(identity.clone())
                    .with_document(doc.clone())
                    .with_value(value)
                    .with_args(args.clone());

                async move { (path.as_str(), evaluate(Some(rule), &ctx).await) }
            });

        let verdicts = join_all(checks).await;

        let mut masked = (*doc).clone();
        for (path, allowed) in verdicts {
            if !allowed {
                trace!(path, kind = kind.name(), "rule denied, stripping path");
                document::remove_path(&mut masked, path);
            }
        }

        Masked::Document(masked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Declaration, Rule};
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn masker(declaration: Declaration) -> DocumentMasker {
        DocumentMasker::new(Arc::new(RuleTable::compile(&declaration)))
    }

    fn identity(claims: Value) -> Arc<Identity> {
        Arc::new(Identity::from_claims(claims))
    }

    fn no_args() -> Arc<Vec<Value>> {
        Arc::new(Vec::new())
    }

    #[tokio::test]
    async fn test_denied_field_stripped_siblings_kept() {
        // Rule table { "$": {read: true}, "secret": {read: false} }
        let masker = masker(
            Declaration::new()
                .read(Rule::allow())
                .field("secret", Declaration::new().read(Rule::deny())),
        );
        let doc = json!({"a": 1, "secret": 2});

        let masked = masker
            .mask(&identity(json!({})), &doc, RuleKind::Read, &no_args())
            .await;
        assert_eq!(masked, Masked::Document(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_root_rule_denies_whole_document() {
        let masker = masker(
            Declaration::new().read(Rule::when(|ctx| ctx.claim_str("role") == Some("admin"))),
        );
        let doc = json!({"a": 1});

        let denied = masker
            .mask(&identity(json!({"role": "guest"})), &doc, RuleKind::Read, &no_args())
            .await;
        assert!(denied.is_denied());

        let allowed = masker
            .mask(&identity(json!({"role": "admin"})), &doc, RuleKind::Read, &no_args())
            .await;
        assert_eq!(allowed, Masked::Document(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_root_denial_short_circuits_field_rules() {
        let field_evals = Arc::new(AtomicUsize::new(0));
        let seen = field_evals.clone();

        let masker = masker(
            Declaration::new().read(Rule::deny()).field(
                "a",
                Declaration::new().read(Rule::when(move |_ctx| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    true
                })),
            ),
        );

        let masked = masker
            .mask(&identity(json!({})), &json!({"a": 1}), RuleKind::Read, &no_args())
            .await;

        assert!(masked.is_denied());
        assert_eq!(field_evals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ungoverned_fields_pass_through() {
        let masker = masker(
            Declaration::new().field("secret", Declaration::new().read(Rule::deny())),
        );
        let doc = json!({"free": "data", "nested": {"x": 1}, "secret": 2});

        let masked = masker
            .mask(&identity(json!({})), &doc, RuleKind::Read, &no_args())
            .await;
        assert_eq!(
            masked,
            Masked::Document(json!({"free": "data", "nested": {"x": 1}}))
        );
    }

    #[tokio::test]
    async fn test_masking_is_idempotent() {
        let masker = masker(
            Declaration::new()
                .field("secret", Declaration::new().read(Rule::deny()))
                .field(
                    "profile",
                    Declaration::new().field("email", Declaration::new().read(Rule::deny())),
                ),
        );
        let doc = json!({"a": 1, "secret": 2, "profile": {"email": "x", "name": "n"}});
        let caller = identity(json!({}));

        let once = masker
            .mask(&caller, &doc, RuleKind::Read, &no_args())
            .await
            .into_value()
            .unwrap();
        let twice = masker
            .mask(&caller, &once, RuleKind::Read, &no_args())
            .await
            .into_value()
            .unwrap();

        assert_eq!(once, json!({"a": 1, "profile": {"name": "n"}}));
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_input_document_never_mutated() {
        let masker = masker(
            Declaration::new().field("secret", Declaration::new().read(Rule::deny())),
        );
        let doc = json!({"a": 1, "secret": 2});

        let _ = masker
            .mask(&identity(json!({})), &doc, RuleKind::Read, &no_args())
            .await;
        assert_eq!(doc, json!({"a": 1, "secret": 2}));
    }

    #[tokio::test]
    async fn test_rule_sees_field_value_and_args() {
        let masker = masker(Declaration::new().field(
            "amount",
            Declaration::new().write(Rule::when(|ctx| {
                ctx.value().as_u64().unwrap_or(0) <= 100
                    && ctx.args().first().is_some()
            })),
        ));
        let caller = identity(json!({}));
        let args = Arc::new(vec![json!("42")]);

        let small = masker
            .mask(&caller, &json!({"amount": 50}), RuleKind::Write, &args)
            .await;
        assert_eq!(small, Masked::Document(json!({"amount": 50})));

        let large = masker
            .mask(&caller, &json!({"amount": 5000}), RuleKind::Write, &args)
            .await;
        assert_eq!(large, Masked::Document(json!({})));
    }

    #[tokio::test]
    async fn test_missing_path_evaluates_null_value() {
        let masker = masker(Declaration::new().field(
            "deep",
            Declaration::new().field(
                "leaf",
                Declaration::new().read(Rule::when(|ctx| !ctx.value().is_null())),
            ),
        ));

        // Path absent from the document: rule sees null and denies, which
        // is a no-op removal.
        let masked = masker
            .mask(&identity(json!({})), &json!({"other": 1}), RuleKind::Read, &no_args())
            .await;
        assert_eq!(masked, Masked::Document(json!({"other": 1})));
    }

    #[tokio::test]
    async fn test_async_rules_run_concurrently() {
        let peak = Arc::new(AtomicUsize::new(0));
        let in_flight = Arc::new(AtomicUsize::new(0));

        let mut declaration = Declaration::new();
        for name in ["a", "b", "c", "d"] {
            let peak = peak.clone();
            let in_flight = in_flight.clone();
            declaration = declaration.field(
                name,
                Declaration::new().read(Rule::when_async(move |_ctx| {
                    let peak = peak.clone();
                    let in_flight = in_flight.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(true)
                    }
                    .boxed()
                })),
            );
        }

        let masker = masker(declaration);
        let doc = json!({"a": 1, "b": 2, "c": 3, "d": 4});
        let masked = masker
            .mask(&identity(json!({})), &doc, RuleKind::Read, &no_args())
            .await;

        assert_eq!(masked, Masked::Document(doc));
        assert!(peak.load(Ordering::SeqCst) > 1, "rules did not overlap");
    }
}
