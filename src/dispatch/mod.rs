//! Operation dispatch.
//!
//! Routes every call through the masking engine before persistence.
//! Identity is the explicit first parameter of every operation; there is
//! no implicit binding; the transport snapshots the session identity and
//! passes it here.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::collection::Collection;
use crate::document;
use crate::error::CallError;
use crate::identity::Identity;
use crate::mask::Masked;
use crate::rpc::Operation;
use crate::rules::{evaluate, RuleContext, RuleKind};
use crate::store::SharedStore;

/// Dispatches collection operations, consulting rules before touching
/// persistence.
pub struct Dispatcher {
    collections: HashMap<String, Arc<Collection>>,
    store: SharedStore,
}

impl Dispatcher {
    pub fn new(store: SharedStore) -> Self {
        Self {
            collections: HashMap::new(),
            store,
        }
    }

    /// Register a collection. Re-registering a name replaces the previous
    /// collection.
    pub fn register(&mut self, collection: Collection) {
        let name = collection.name().to_string();
        if self
            .collections
            .insert(name.clone(), Arc::new(collection))
            .is_some()
        {
            warn!(collection = %name, "collection re-registered, replacing");
        } else {
            debug!(collection = %name, "collection registered");
        }
    }

    /// Names of all registered collections, sorted.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    fn collection(&self, name: &str) -> Result<&Arc<Collection>, CallError> {
        self.collections
            .get(name)
            .ok_or_else(|| CallError::UnknownCollection(name.to_string()))
    }

    /// Wire-level entry point: route a parsed operation with raw
    /// positional arguments.
    pub async fn call(
        &self,
        identity: &Arc<Identity>,
        collection: &str,
        operation: &Operation,
        args: Vec<Value>,
    ) -> Result<Value, CallError> {
        match operation {
            Operation::Document => {
                let id = required_id(&args, 0, "id")?;
                self.document(identity, collection, &id).await
            }
            Operation::Save => {
                let id = required_id(&args, 0, "id")?;
                let payload = optional_payload(&args, 1);
                self.save(identity, collection, &id, payload).await
            }
            Operation::Validate => {
                let id = required_id(&args, 0, "id")?;
                let payload = optional_payload(&args, 1);
                self.validate(identity, collection, &id, payload).await
            }
            Operation::Query => {
                let criteria = args.first().cloned().unwrap_or(Value::Null);
                self.query(identity, collection, criteria).await
            }
            Operation::FindOne => {
                let criteria = args.first().cloned().unwrap_or(Value::Null);
                self.find_one(identity, collection, criteria).await
            }
            Operation::Create => self.create(identity, collection).await,
            Operation::Method(name) => {
                let id = required_id(&args, 0, "id")?;
                let rest = args.get(1..).unwrap_or_default().to_vec();
                self.invoke_method(identity, collection, &id, name, rest).await
            }
            Operation::Static(name) => {
                self.invoke_static(identity, collection, name, args).await
            }
        }
    }

    /// Fetch a document and mask it for the caller.
    ///
    /// A root read-rule denial yields `null`, never a partial document.
    pub async fn document(
        &self,
        identity: &Arc<Identity>,
        collection: &str,
        id: &str,
    ) -> Result<Value, CallError> {
        let coll = self.collection(collection)?;
        if !coll.capabilities().document {
            return Err(CallError::Unsupported(format!("{collection}.document")));
        }

        let doc = self
            .store
            .fetch_by_id(collection, id)
            .await?
            .ok_or_else(|| CallError::NotFound(format!("{collection}/{id}")))?;

        let args = Arc::new(vec![Value::String(id.to_string())]);
        Ok(coll
            .masker()
            .mask(identity, &doc, RuleKind::Read, &args)
            .await
            .into_value()
            .unwrap_or(Value::Null))
    }

    /// Strip disallowed fields from the payload, merge, persist, and
    /// return the saved document masked for reading.
    ///
    /// The write mask strictly precedes the persist, and the persist
    /// strictly precedes the result mask.
    pub async fn save(
        &self,
        identity: &Arc<Identity>,
        collection: &str,
        id: &str,
        payload: Value,
    ) -> Result<Value, CallError> {
        let coll = self.collection(collection)?;
        if !coll.capabilities().save {
            return Err(CallError::Unsupported(format!("{collection}.save")));
        }

        let args = Arc::new(vec![Value::String(id.to_string()), payload.clone()]);
        let stripped = match coll
            .masker()
            .mask(identity, &payload, RuleKind::Write, &args)
            .await
        {
            Masked::Document(stripped) => stripped,
            Masked::Denied => {
                return Err(CallError::PermissionDenied(format!(
                    "write to {collection}/{id} denied"
                )));
            }
        };

        let mut doc = self
            .store
            .fetch_by_id(collection, id)
            .await?
            .unwrap_or_else(|| Value::Object(Map::new()));
        document::deep_merge(&mut doc, &stripped);

        let saved = self.store.upsert(collection, id, doc).await?;

        Ok(coll
            .masker()
            .mask(identity, &saved, RuleKind::Read, &args)
            .await
            .into_value()
            .unwrap_or(Value::Null))
    }

    /// Run the save pipeline up to (and including) store validation, but
    /// persist nothing. The outcome is reported as a value, not an error.
    pub async fn validate(
        &self,
        identity: &Arc<Identity>,
        collection: &str,
        id: &str,
        payload: Value,
    ) -> Result<Value, CallError> {
        let coll = self.collection(collection)?;
        if !coll.capabilities().validate {
            return Err(CallError::Unsupported(format!("{collection}.validate")));
        }

        let args = Arc::new(vec![Value::String(id.to_string()), payload.clone()]);
        let stripped = match coll
            .masker()
            .mask(identity, &payload, RuleKind::Write, &args)
            .await
        {
            Masked::Document(stripped) => stripped,
            Masked::Denied => {
                return Err(CallError::PermissionDenied(format!(
                    "write to {collection}/{id} denied"
                )));
            }
        };

        let mut doc = self
            .store
            .fetch_by_id(collection, id)
            .await?
            .unwrap_or_else(|| Value::Object(Map::new()));
        document::deep_merge(&mut doc, &stripped);

        match self.store.validate(collection, &doc).await {
            Ok(()) => Ok(serde_json::json!({"valid": true})),
            Err(crate::store::StoreError::Validation(message)) => {
                Ok(serde_json::json!({"valid": false, "message": message}))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Fetch documents matching criteria and mask each independently;
    /// documents whose root rule denies are dropped. Order follows the
    /// store's native result order.
    pub async fn query(
        &self,
        identity: &Arc<Identity>,
        collection: &str,
        criteria: Value,
    ) -> Result<Value, CallError> {
        let coll = self.collection(collection)?;
        if !coll.capabilities().query {
            return Err(CallError::Unsupported(format!("{collection}.query")));
        }

        let docs = self.store.fetch_many(collection, &criteria).await?;
        let args = Arc::new(vec![criteria]);

        let masked = join_all(
            docs.iter()
                .map(|doc| coll.masker().mask(identity, doc, RuleKind::Read, &args)),
        )
        .await;

        Ok(Value::Array(
            masked.into_iter().filter_map(Masked::into_value).collect(),
        ))
    }

    /// First surviving document matching criteria.
    pub async fn find_one(
        &self,
        identity: &Arc<Identity>,
        collection: &str,
        criteria: Value,
    ) -> Result<Value, CallError> {
        match self.query(identity, collection, criteria).await? {
            Value::Array(mut docs) if !docs.is_empty() => Ok(docs.swap_remove(0)),
            _ => Err(CallError::NotFound(collection.to_string())),
        }
    }

    /// A fresh empty document masked for reading; never persisted.
    pub async fn create(
        &self,
        identity: &Arc<Identity>,
        collection: &str,
    ) -> Result<Value, CallError> {
        let coll = self.collection(collection)?;
        if !coll.capabilities().create {
            return Err(CallError::Unsupported(format!("{collection}.create")));
        }

        let empty = Value::Object(Map::new());
        let args = Arc::new(Vec::new());
        Ok(coll
            .masker()
            .mask(identity, &empty, RuleKind::Read, &args)
            .await
            .into_value()
            .unwrap_or(Value::Null))
    }

    /// Invoke a document-scoped method: rule first, fetch second, handler
    /// last. The permission check sees `{identity, args}` only.
    pub async fn invoke_method(
        &self,
        identity: &Arc<Identity>,
        collection: &str,
        id: &str,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, CallError> {
        let coll = self.collection(collection)?;
        let handler = coll
            .method(name)
            .ok_or_else(|| CallError::Unsupported(format!("{collection}.method.{name}")))?;

        let shared_args = Arc::new(args.clone());
        let ctx = RuleContext::new(identity.clone()).with_args(shared_args);
        let rule = coll.table().rule_at(RuleKind::Method, name);
        if !evaluate(rule, &ctx).await {
            debug!(collection, method = name, "method rule denied");
            return Err(CallError::PermissionDenied(format!(
                "method {collection}.{name} denied"
            )));
        }

        let doc = self
            .store
            .fetch_by_id(collection, id)
            .await?
            .ok_or_else(|| CallError::NotFound(format!("{collection}/{id}")))?;

        handler(doc, args)
            .await
            .map_err(|error| CallError::Handler(error.to_string()))
    }

    /// Invoke a collection-level static operation; no document fetch.
    pub async fn invoke_static(
        &self,
        identity: &Arc<Identity>,
        collection: &str,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, CallError> {
        let coll = self.collection(collection)?;
        let handler = coll
            .static_handler(name)
            .ok_or_else(|| CallError::Unsupported(format!("{collection}.static.{name}")))?;

        let shared_args = Arc::new(args.clone());
        let ctx = RuleContext::new(identity.clone()).with_args(shared_args);
        let rule = coll.table().rule_at(RuleKind::Static, name);
        if !evaluate(rule, &ctx).await {
            debug!(collection, static_op = name, "static rule denied");
            return Err(CallError::PermissionDenied(format!(
                "static {collection}.{name} denied"
            )));
        }

        handler(args)
            .await
            .map_err(|error| CallError::Handler(error.to_string()))
    }
}

/// Extract a required id argument; strings and numbers are accepted.
fn required_id(args: &[Value], index: usize, name: &'static str) -> Result<String, CallError> {
    match args.get(index) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(CallError::MissingArgument(name)),
    }
}

/// Payload argument; absent means an empty object.
fn optional_payload(args: &[Value], index: usize) -> Value {
    args.get(index)
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Capabilities;
    use crate::rules::{Declaration, Rule};
    use crate::store::{DocumentStore, MemoryStore};
    use futures::FutureExt;
    use serde_json::json;

    fn admin() -> Arc<Identity> {
        Arc::new(Identity::from_claims(json!({"role": "admin", "sub": "a1"})))
    }

    fn guest() -> Arc<Identity> {
        Arc::new(Identity::from_claims(json!({"role": "guest", "sub": "g1"})))
    }

    fn admin_only() -> Rule {
        Rule::when(|ctx| ctx.claim_str("role") == Some("admin"))
    }

    fn users_collection() -> Collection {
        Collection::builder("users")
            .rules(
                Declaration::new()
                    .field("secret", Declaration::new().read(admin_only()))
                    .field("locked", Declaration::new().write(admin_only()))
                    .method("promote", admin_only())
                    .static_op("signup", Rule::allow()),
            )
            .method("promote", |doc, args| {
                async move { Ok(json!({"promoted": doc, "args": args})) }.boxed()
            })
            .static_op("signup", |args| async move { Ok(json!({"signed_up": args})) }.boxed())
            .build()
    }

    fn dispatcher_with(store: Arc<MemoryStore>) -> Dispatcher {
        let mut dispatcher = Dispatcher::new(store);
        dispatcher.register(users_collection());
        dispatcher
    }

    #[tokio::test]
    async fn test_document_masks_per_caller() {
        let store = Arc::new(MemoryStore::new());
        store.seed("users", "1", json!({"name": "x", "secret": "s3"}));
        let dispatcher = dispatcher_with(store);

        let full = dispatcher.document(&admin(), "users", "1").await.unwrap();
        assert_eq!(full, json!({"name": "x", "secret": "s3"}));

        let redacted = dispatcher.document(&guest(), "users", "1").await.unwrap();
        assert_eq!(redacted, json!({"name": "x"}));
    }

    #[tokio::test]
    async fn test_document_not_found() {
        let dispatcher = dispatcher_with(Arc::new(MemoryStore::new()));
        let err = dispatcher.document(&admin(), "users", "9").await.unwrap_err();
        assert!(matches!(err, CallError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let dispatcher = dispatcher_with(Arc::new(MemoryStore::new()));
        let err = dispatcher.document(&admin(), "ghosts", "1").await.unwrap_err();
        assert!(matches!(err, CallError::UnknownCollection(_)));
    }

    #[tokio::test]
    async fn test_save_strips_write_denied_fields_before_persist() {
        let store = Arc::new(MemoryStore::new());
        store.seed("users", "42", json!({"name": "old", "locked": false}));
        let dispatcher = dispatcher_with(store.clone());

        dispatcher
            .save(&guest(), "users", "42", json!({"locked": true, "name": "x"}))
            .await
            .unwrap();

        // The denied field never reached persistence; the allowed one
        // merged onto the existing record.
        let raw = store.fetch_by_id("users", "42").await.unwrap().unwrap();
        assert_eq!(raw, json!({"name": "x", "locked": false}));

        dispatcher
            .save(&admin(), "users", "42", json!({"locked": true}))
            .await
            .unwrap();
        let raw = store.fetch_by_id("users", "42").await.unwrap().unwrap();
        assert_eq!(raw, json!({"name": "x", "locked": true}));
    }

    #[tokio::test]
    async fn test_save_reports_store_validation_failure() {
        let store = Arc::new(
            MemoryStore::new().with_validator("users", |doc| {
                if doc.get("name").is_none() {
                    Err("name is required".into())
                } else {
                    Ok(())
                }
            }),
        );
        let dispatcher = dispatcher_with(store);

        let err = dispatcher
            .save(&admin(), "users", "1", json!({"locked": true}))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_save_result_masked_for_reading() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher_with(store);

        let saved = dispatcher
            .save(&guest(), "users", "1", json!({"name": "x", "secret": "mine"}))
            .await
            .unwrap();
        // The guest may write `secret` (no write rule) but not read it back.
        assert_eq!(saved, json!({"name": "x"}));
    }

    #[tokio::test]
    async fn test_root_write_denial_rejects_save() {
        let store = Arc::new(MemoryStore::new());
        let mut dispatcher = Dispatcher::new(store.clone());
        dispatcher.register(
            Collection::builder("ledger")
                .rules(Declaration::new().write(admin_only()))
                .build(),
        );

        let err = dispatcher
            .save(&guest(), "ledger", "1", json!({"amount": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::PermissionDenied(_)));
        assert_eq!(store.document_count("ledger"), 0);

        dispatcher
            .save(&admin(), "ledger", "1", json!({"amount": 1}))
            .await
            .unwrap();
        assert_eq!(store.document_count("ledger"), 1);
    }

    #[tokio::test]
    async fn test_validate_reports_without_persisting() {
        let store = Arc::new(
            MemoryStore::new().with_validator("users", |doc| {
                if doc.get("name").is_none() {
                    Err("name is required".into())
                } else {
                    Ok(())
                }
            }),
        );
        let dispatcher = dispatcher_with(store.clone());

        let invalid = dispatcher
            .validate(&admin(), "users", "1", json!({}))
            .await
            .unwrap();
        assert_eq!(invalid["valid"], json!(false));

        let valid = dispatcher
            .validate(&admin(), "users", "1", json!({"name": "x"}))
            .await
            .unwrap();
        assert_eq!(valid, json!({"valid": true}));

        assert_eq!(store.document_count("users"), 0);
    }

    #[tokio::test]
    async fn test_query_masks_each_and_drops_denied() {
        let store = Arc::new(MemoryStore::new());
        store.seed("docs", "1", json!({"owner": "g1", "n": 1}));
        store.seed("docs", "2", json!({"owner": "a1", "n": 2}));
        store.seed("docs", "3", json!({"owner": "g1", "n": 3}));

        let mut dispatcher = Dispatcher::new(store);
        dispatcher.register(
            Collection::builder("docs")
                .rules(Declaration::new().read(Rule::when(|ctx| {
                    document::deep_value(ctx.document(), "owner").and_then(Value::as_str)
                        == ctx.claim_str("sub")
                })))
                .build(),
        );

        let mine = dispatcher
            .query(&guest(), "docs", Value::Null)
            .await
            .unwrap();
        assert_eq!(
            mine,
            json!([{"owner": "g1", "n": 1}, {"owner": "g1", "n": 3}])
        );
    }

    #[tokio::test]
    async fn test_find_one() {
        let store = Arc::new(MemoryStore::new());
        store.seed("users", "1", json!({"name": "x"}));
        let dispatcher = dispatcher_with(store);

        let found = dispatcher
            .find_one(&guest(), "users", json!({"name": "x"}))
            .await
            .unwrap();
        assert_eq!(found, json!({"name": "x"}));

        let err = dispatcher
            .find_one(&guest(), "users", json!({"name": "nope"}))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_returns_masked_empty_document_without_persisting() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher_with(store.clone());

        let fresh = dispatcher.create(&guest(), "users").await.unwrap();
        assert_eq!(fresh, json!({}));
        assert_eq!(store.document_count("users"), 0);
    }

    #[tokio::test]
    async fn test_method_rule_gates_invocation() {
        let store = Arc::new(MemoryStore::new());
        store.seed("users", "1", json!({"name": "x"}));
        let dispatcher = dispatcher_with(store);

        let err = dispatcher
            .invoke_method(&guest(), "users", "1", "promote", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::PermissionDenied(_)));

        let result = dispatcher
            .invoke_method(&admin(), "users", "1", "promote", vec![json!("lead")])
            .await
            .unwrap();
        assert_eq!(
            result,
            json!({"promoted": {"name": "x"}, "args": ["lead"]})
        );
    }

    #[tokio::test]
    async fn test_method_permission_checked_before_fetch() {
        // Guest denied even though the document does not exist.
        let dispatcher = dispatcher_with(Arc::new(MemoryStore::new()));

        let err = dispatcher
            .invoke_method(&guest(), "users", "missing", "promote", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::PermissionDenied(_)));

        // Admin passes the rule, then hits NotFound.
        let err = dispatcher
            .invoke_method(&admin(), "users", "missing", "promote", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_static_invocation_without_fetch() {
        let dispatcher = dispatcher_with(Arc::new(MemoryStore::new()));

        let result = dispatcher
            .invoke_static(&guest(), "users", "signup", vec![json!("g@x")])
            .await
            .unwrap();
        assert_eq!(result, json!({"signed_up": ["g@x"]}));

        let err = dispatcher
            .invoke_static(&guest(), "users", "nope", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_capability_flags_checked() {
        let mut dispatcher = Dispatcher::new(Arc::new(MemoryStore::new()));
        dispatcher.register(
            Collection::builder("audit")
                .capabilities(Capabilities::read_only())
                .build(),
        );

        let err = dispatcher
            .save(&admin(), "audit", "1", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_call_requires_id_argument() {
        let dispatcher = dispatcher_with(Arc::new(MemoryStore::new()));

        let err = dispatcher
            .call(&admin(), "users", &Operation::Document, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::MissingArgument("id")));

        // Numeric ids are accepted.
        let err = dispatcher
            .call(&admin(), "users", &Operation::Document, vec![json!(42)])
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::NotFound(_)));
    }
}
