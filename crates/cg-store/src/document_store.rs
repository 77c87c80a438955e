//! Backend-neutral document store.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{Fields, Value};

/// Collection names.
pub mod collections {
    pub const GUARDS: &str = "guards";
    pub const CAMERAS: &str = "cameras";
    pub const GATE_SETTINGS: &str = "gate_settings";
    pub const USERS: &str = "users";
}

/// A document read back from a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Fields,
}

/// An equality filter on one field.
pub type FieldEq = (String, Value);

/// Flat collections of documents addressed by id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs and metrics.
    fn backend(&self) -> &'static str;

    /// Create a document; fails with `AlreadyExists` if the id is taken.
    async fn insert(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()>;

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<StoredDocument>>;

    /// Create or fully replace a document.
    async fn upsert(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()>;

    /// Delete a document. Deleting a missing document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    /// Documents whose fields equal every filter value.
    async fn find(&self, collection: &str, filters: &[FieldEq]) -> StoreResult<Vec<StoredDocument>>;

    /// Cheap reachability check for the readiness endpoint.
    async fn ping(&self) -> StoreResult<()>;
}
