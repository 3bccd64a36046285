//! Document persistence.
//!
//! The engine never issues storage queries itself; everything goes through
//! the [`DocumentStore`] trait. Implementations must be thread-safe and
//! support concurrent independent operations; the dispatcher shares one
//! handle across all in-flight calls.

mod memory;

pub use memory::{MemoryStore, Validator};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Storage error types.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document failed the store's validation; recoverable, reported
    /// to the caller.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence collaborator contract.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by id, or `None` if absent.
    async fn fetch_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Fetch all documents matching criteria, in the store's native order.
    async fn fetch_many(
        &self,
        collection: &str,
        criteria: &Value,
    ) -> Result<Vec<Value>, StoreError>;

    /// Persist a document under an id, inserting or replacing, and return
    /// the saved document.
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        document: Value,
    ) -> Result<Value, StoreError>;

    /// Validate a document without persisting it.
    async fn validate(&self, _collection: &str, _document: &Value) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Shared store handle.
pub type SharedStore = Arc<dyn DocumentStore>;
