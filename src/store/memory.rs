//! In-memory document store.
//!
//! Volatile storage for development and testing. All data is lost on
//! restart. Documents are kept per collection in id order, which is the
//! "native order" query results follow.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::document;

use super::{DocumentStore, StoreError};

/// Per-collection validation hook; an `Err` message becomes a
/// [`StoreError::Validation`].
pub type Validator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// In-memory store implementation.
///
/// Thread-safe via `RwLock`; reads from concurrent calls proceed in
/// parallel.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
    validators: HashMap<String, Validator>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a validation hook to a collection.
    pub fn with_validator<F>(mut self, collection: impl Into<String>, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validators.insert(collection.into(), Arc::new(validator));
        self
    }

    /// Insert a document directly, bypassing validation. For seeding
    /// fixtures and demo data.
    pub fn seed(&self, collection: &str, id: &str, document: Value) {
        let mut collections = self.collections.write().unwrap();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
    }

    /// Number of documents in a collection.
    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .unwrap()
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    fn run_validator(&self, collection: &str, doc: &Value) -> Result<(), StoreError> {
        if let Some(validator) = self.validators.get(collection) {
            validator(doc).map_err(StoreError::Validation)?;
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let collections = self.collections.read().unwrap();
        Ok(collections.get(collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn fetch_many(
        &self,
        collection: &str,
        criteria: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read().unwrap();
        let docs = match collections.get(collection) {
            Some(docs) => docs,
            None => return Ok(Vec::new()),
        };

        Ok(docs
            .values()
            .filter(|doc| document::matches_criteria(doc, criteria))
            .cloned()
            .collect())
    }

    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        doc: Value,
    ) -> Result<Value, StoreError> {
        self.run_validator(collection, &doc)?;

        let mut collections = self.collections.write().unwrap();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc.clone());

        debug!(collection, id, "document upserted");
        Ok(doc)
    }

    async fn validate(&self, collection: &str, doc: &Value) -> Result<(), StoreError> {
        self.run_validator(collection, doc)
    }
}
