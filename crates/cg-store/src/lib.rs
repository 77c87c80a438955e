//! Persistence for the CrowdGuard backend.
//!
//! This crate provides:
//! - A backend-neutral [`DocumentStore`] trait
//! - A Firestore REST backend with token caching and retries
//! - An in-memory backend for development and tests
//! - Account-scoped repositories for guards, cameras and gate settings

pub mod client;
pub mod document_store;
pub mod error;
pub mod keys;
pub mod memory;
pub mod metrics;
pub mod repos;
pub mod retry;
pub mod token_cache;
pub mod types;

use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

pub use client::{FirestoreClient, FirestoreConfig};
pub use document_store::{collections, DocumentStore, StoredDocument};
pub use error::{StoreError, StoreResult};
pub use keys::{hash_password, verify_password};
pub use memory::MemoryStore;
pub use repos::{CameraRepository, GateSettingsRepository, GuardRepository, UserRepository};

/// Which backend to persist to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Memory,
    Firestore,
}

impl FromStr for StoreBackend {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "memory" => Ok(StoreBackend::Memory),
            "firestore" => Ok(StoreBackend::Firestore),
            other => Err(StoreError::Config(format!("unknown STORE_BACKEND '{}'", other))),
        }
    }
}

/// Open the configured backend.
pub async fn open_store(backend: StoreBackend) -> StoreResult<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Firestore => Arc::new(FirestoreClient::from_env().await?),
    };
    info!(backend = store.backend(), "Document store ready");
    Ok(store)
}
