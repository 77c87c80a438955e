//! In-process document store.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document_store::{DocumentStore, FieldEq, StoredDocument};
use crate::error::{StoreError, StoreResult};
use crate::metrics::record_request;
use crate::types::Fields;

const BACKEND: &str = "memory";

/// Documents held in memory, lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Fields>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn observe<T>(operation: &str, started: Instant, result: &StoreResult<T>) {
    let status = match result {
        Ok(_) => 200,
        Err(e) => e.http_status().unwrap_or(500),
    };
    record_request(BACKEND, operation, status, started.elapsed().as_secs_f64() * 1000.0);
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn insert(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        let started = Instant::now();
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        let result = if docs.contains_key(id) {
            Err(StoreError::AlreadyExists(format!("{}/{}", collection, id)))
        } else {
            docs.insert(id.to_string(), fields);
            Ok(())
        };
        observe("insert", started, &result);
        result
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<StoredDocument>> {
        let started = Instant::now();
        let collections = self.collections.read().await;
        let result = Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| StoredDocument {
                id: id.to_string(),
                fields: fields.clone(),
            }));
        observe("get", started, &result);
        result
    }

    async fn upsert(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        let started = Instant::now();
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        let result = Ok(());
        observe("upsert", started, &result);
        result
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let started = Instant::now();
        if let Some(docs) = self.collections.write().await.get_mut(collection) {
            docs.remove(id);
        }
        let result = Ok(());
        observe("delete", started, &result);
        result
    }

    async fn find(
        &self,
        collection: &str,
        filters: &[FieldEq],
    ) -> StoreResult<Vec<StoredDocument>> {
        let started = Instant::now();
        let collections = self.collections.read().await;
        let found = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| {
                        filters
                            .iter()
                            .all(|(name, value)| fields.get(name) == Some(value))
                    })
                    .map(|(id, fields)| StoredDocument {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let result = Ok(found);
        observe("find", started, &result);
        result
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToFirestoreValue;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_firestore_value()))
            .collect()
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let store = MemoryStore::new();
        store.insert("guards", "g1", fields(&[("name", "Ravi")])).await.unwrap();
        let err = store.insert("guards", "g1", fields(&[])).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_find_applies_every_filter() {
        let store = MemoryStore::new();
        store
            .insert("guards", "g1", fields(&[("user_email", "a@x.in"), ("gate", "A")]))
            .await
            .unwrap();
        store
            .insert("guards", "g2", fields(&[("user_email", "a@x.in"), ("gate", "B")]))
            .await
            .unwrap();
        store
            .insert("guards", "g3", fields(&[("user_email", "b@x.in"), ("gate", "A")]))
            .await
            .unwrap();

        let by_account = store
            .find("guards", &[("user_email".to_string(), "a@x.in".to_firestore_value())])
            .await
            .unwrap();
        assert_eq!(by_account.len(), 2);

        let by_gate = store
            .find(
                "guards",
                &[
                    ("user_email".to_string(), "a@x.in".to_firestore_value()),
                    ("gate".to_string(), "A".to_firestore_value()),
                ],
            )
            .await
            .unwrap();
        assert_eq!(by_gate.len(), 1);
        assert_eq!(by_gate[0].id, "g1");
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.upsert("cameras", "c", fields(&[("rtsp_url", "0")])).await.unwrap();
        store.upsert("cameras", "c", fields(&[("rtsp_url", "1")])).await.unwrap();
        let doc = store.get("cameras", "c").await.unwrap().unwrap();
        assert_eq!(doc.fields.get("rtsp_url"), Some(&"1".to_firestore_value()));
        assert_eq!(store.find("cameras", &[]).await.unwrap().len(), 1);

        store.delete("cameras", "c").await.unwrap();
        store.delete("cameras", "c").await.unwrap();
        assert!(store.get("cameras", "c").await.unwrap().is_none());
    }
}
