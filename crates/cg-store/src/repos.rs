//! Account-scoped repositories.
//!
//! Every repository except [`UserRepository`] is bound to one account at
//! construction. Reads always filter on `user_email`, and reads by id check
//! the owning account, so another account's documents look absent.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use cg_models::{AccountId, Camera, CameraStatus, GateSettings, Guard, GuardId, GuardStatus, User};

use crate::document_store::{collections, DocumentStore, FieldEq, StoredDocument};
use crate::error::{StoreError, StoreResult};
use crate::keys::{gate_doc_id, user_doc_id};
use crate::types::{Fields, FromFirestoreValue, ToFirestoreValue};

// =============================================================================
// Field helpers
// =============================================================================

fn required<T: FromFirestoreValue>(
    collection: &str,
    doc: &StoredDocument,
    name: &str,
) -> StoreResult<T> {
    doc.fields
        .get(name)
        .and_then(T::from_firestore_value)
        .ok_or_else(|| {
            StoreError::malformed(
                format!("{}/{}", collection, doc.id),
                format!("missing field '{}'", name),
            )
        })
}

fn parsed<T: std::str::FromStr>(
    collection: &str,
    doc: &StoredDocument,
    name: &str,
) -> StoreResult<T> {
    let raw: String = required(collection, doc, name)?;
    raw.parse()
        .map_err(|_| {
            StoreError::malformed(
                format!("{}/{}", collection, doc.id),
                format!("invalid '{}': {}", name, raw),
            )
        })
}

fn timestamp(collection: &str, doc: &StoredDocument, name: &str) -> StoreResult<DateTime<Utc>> {
    required(collection, doc, name)
}

fn account_filter(account: &AccountId) -> FieldEq {
    ("user_email".to_string(), account.as_str().to_firestore_value())
}

fn owned_by(doc: &StoredDocument, account: &AccountId) -> bool {
    doc.fields.get("user_email") == Some(&account.as_str().to_firestore_value())
}

fn ensure_owner(account: &AccountId, owner: &AccountId) -> StoreResult<()> {
    if account == owner {
        Ok(())
    } else {
        Err(StoreError::PermissionDenied(format!(
            "record belongs to a different account than {}",
            account
        )))
    }
}

// =============================================================================
// Guards
// =============================================================================

fn guard_to_fields(guard: &Guard) -> Fields {
    let mut fields = HashMap::new();
    fields.insert("id".to_string(), guard.id.as_str().to_firestore_value());
    fields.insert("user_email".to_string(), guard.user_email.as_str().to_firestore_value());
    fields.insert("name".to_string(), guard.name.to_firestore_value());
    fields.insert("mobile".to_string(), guard.mobile.to_firestore_value());
    fields.insert("gate".to_string(), guard.gate.to_firestore_value());
    fields.insert("status".to_string(), guard.status.as_str().to_firestore_value());
    fields.insert("created_at".to_string(), guard.created_at.to_firestore_value());
    fields
}

fn document_to_guard(doc: &StoredDocument) -> StoreResult<Guard> {
    let c = collections::GUARDS;
    Ok(Guard {
        id: GuardId::from(doc.id.as_str()),
        user_email: parsed(c, doc, "user_email")?,
        name: required(c, doc, "name")?,
        mobile: required(c, doc, "mobile")?,
        gate: required(c, doc, "gate")?,
        status: parsed::<GuardStatus>(c, doc, "status").unwrap_or_default(),
        created_at: timestamp(c, doc, "created_at")?,
    })
}

/// Guards belonging to one account.
pub struct GuardRepository {
    store: Arc<dyn DocumentStore>,
    account: AccountId,
}

impl GuardRepository {
    pub fn new(store: Arc<dyn DocumentStore>, account: AccountId) -> Self {
        Self { store, account }
    }

    /// Store a new guard owned by this repository's account.
    pub async fn create(&self, guard: &Guard) -> StoreResult<()> {
        ensure_owner(&self.account, &guard.user_email)?;
        self.store
            .insert(collections::GUARDS, guard.id.as_str(), guard_to_fields(guard))
            .await?;
        info!(account = %self.account, gate = %guard.gate, guard_id = %guard.id, "Created guard");
        Ok(())
    }

    /// All guards of the account, oldest first.
    pub async fn list(&self) -> StoreResult<Vec<Guard>> {
        self.find(vec![account_filter(&self.account)]).await
    }

    /// Guards assigned to `gate`.
    pub async fn list_for_gate(&self, gate: &str) -> StoreResult<Vec<Guard>> {
        self.find(vec![
            account_filter(&self.account),
            ("gate".to_string(), gate.to_firestore_value()),
        ])
        .await
    }

    pub async fn get(&self, id: &GuardId) -> StoreResult<Option<Guard>> {
        match self.store.get(collections::GUARDS, id.as_str()).await? {
            Some(doc) if owned_by(&doc, &self.account) => Ok(Some(document_to_guard(&doc)?)),
            _ => Ok(None),
        }
    }

    /// Delete a guard. Returns false when it does not exist for this account.
    pub async fn delete(&self, id: &GuardId) -> StoreResult<bool> {
        if self.get(id).await?.is_none() {
            return Ok(false);
        }
        self.store.delete(collections::GUARDS, id.as_str()).await?;
        info!(account = %self.account, guard_id = %id, "Deleted guard");
        Ok(true)
    }

    async fn find(&self, filters: Vec<FieldEq>) -> StoreResult<Vec<Guard>> {
        let mut guards = self
            .store
            .find(collections::GUARDS, &filters)
            .await?
            .iter()
            .map(document_to_guard)
            .collect::<StoreResult<Vec<_>>>()?;
        guards.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(guards)
    }
}

// =============================================================================
// Cameras
// =============================================================================

fn camera_to_fields(camera: &Camera) -> Fields {
    let mut fields = HashMap::new();
    fields.insert("user_email".to_string(), camera.user_email.as_str().to_firestore_value());
    fields.insert("gate".to_string(), camera.gate.to_firestore_value());
    fields.insert("rtsp_url".to_string(), camera.rtsp_url.to_firestore_value());
    fields.insert("status".to_string(), camera.status.as_str().to_firestore_value());
    fields.insert("updated_at".to_string(), camera.updated_at.to_firestore_value());
    fields
}

fn document_to_camera(doc: &StoredDocument) -> StoreResult<Camera> {
    let c = collections::CAMERAS;
    Ok(Camera {
        user_email: parsed(c, doc, "user_email")?,
        gate: required(c, doc, "gate")?,
        rtsp_url: required(c, doc, "rtsp_url")?,
        status: parsed::<CameraStatus>(c, doc, "status").unwrap_or_default(),
        updated_at: timestamp(c, doc, "updated_at")?,
    })
}

/// Camera sources, at most one per gate, for one account.
pub struct CameraRepository {
    store: Arc<dyn DocumentStore>,
    account: AccountId,
}

impl CameraRepository {
    pub fn new(store: Arc<dyn DocumentStore>, account: AccountId) -> Self {
        Self { store, account }
    }

    /// Create or replace the camera for `camera.gate`.
    pub async fn upsert(&self, camera: &Camera) -> StoreResult<()> {
        ensure_owner(&self.account, &camera.user_email)?;
        self.store
            .upsert(
                collections::CAMERAS,
                &gate_doc_id(&self.account, &camera.gate),
                camera_to_fields(camera),
            )
            .await?;
        info!(account = %self.account, gate = %camera.gate, "Saved camera");
        Ok(())
    }

    pub async fn list(&self) -> StoreResult<Vec<Camera>> {
        let mut cameras = self
            .store
            .find(collections::CAMERAS, &[account_filter(&self.account)])
            .await?
            .iter()
            .map(document_to_camera)
            .collect::<StoreResult<Vec<_>>>()?;
        cameras.sort_by(|a, b| a.gate.cmp(&b.gate));
        Ok(cameras)
    }

    pub async fn get(&self, gate: &str) -> StoreResult<Option<Camera>> {
        match self
            .store
            .get(collections::CAMERAS, &gate_doc_id(&self.account, gate))
            .await?
        {
            Some(doc) if owned_by(&doc, &self.account) => Ok(Some(document_to_camera(&doc)?)),
            _ => Ok(None),
        }
    }
}

// =============================================================================
// Gate settings
// =============================================================================

fn document_to_settings(doc: &StoredDocument) -> StoreResult<GateSettings> {
    let c = collections::GATE_SETTINGS;
    Ok(GateSettings {
        user_email: parsed(c, doc, "user_email")?,
        gate: required(c, doc, "gate")?,
        alert_threshold: required(c, doc, "alert_threshold")?,
        updated_at: timestamp(c, doc, "updated_at")?,
    })
}

/// Per-gate overrides for one account.
pub struct GateSettingsRepository {
    store: Arc<dyn DocumentStore>,
    account: AccountId,
}

impl GateSettingsRepository {
    pub fn new(store: Arc<dyn DocumentStore>, account: AccountId) -> Self {
        Self { store, account }
    }

    pub async fn get(&self, gate: &str) -> StoreResult<Option<GateSettings>> {
        match self
            .store
            .get(collections::GATE_SETTINGS, &gate_doc_id(&self.account, gate))
            .await?
        {
            Some(doc) if owned_by(&doc, &self.account) => Ok(Some(document_to_settings(&doc)?)),
            _ => Ok(None),
        }
    }

    /// Set the alert threshold for `gate`.
    pub async fn set_threshold(
        &self,
        gate: &str,
        alert_threshold: u32,
    ) -> StoreResult<GateSettings> {
        let settings = GateSettings {
            user_email: self.account.clone(),
            gate: gate.to_string(),
            alert_threshold,
            updated_at: Utc::now(),
        };

        let mut fields = HashMap::new();
        fields.insert("user_email".to_string(), self.account.as_str().to_firestore_value());
        fields.insert("gate".to_string(), settings.gate.to_firestore_value());
        fields.insert("alert_threshold".to_string(), alert_threshold.to_firestore_value());
        fields.insert("updated_at".to_string(), settings.updated_at.to_firestore_value());

        self.store
            .upsert(collections::GATE_SETTINGS, &gate_doc_id(&self.account, gate), fields)
            .await?;
        info!(account = %self.account, gate = %gate, alert_threshold, "Updated gate settings");
        Ok(settings)
    }
}

// =============================================================================
// Users
// =============================================================================

fn user_to_fields(user: &User) -> Fields {
    let mut fields = HashMap::new();
    fields.insert("name".to_string(), user.name.to_firestore_value());
    fields.insert("email".to_string(), user.email.as_str().to_firestore_value());
    fields.insert("mobile".to_string(), user.mobile.to_firestore_value());
    fields.insert("password_hash".to_string(), user.password_hash.to_firestore_value());
    fields.insert("created_at".to_string(), user.created_at.to_firestore_value());
    fields
}

fn document_to_user(doc: &StoredDocument) -> StoreResult<User> {
    let c = collections::USERS;
    Ok(User {
        name: required(c, doc, "name")?,
        email: parsed(c, doc, "email")?,
        mobile: required(c, doc, "mobile")?,
        password_hash: required(c, doc, "password_hash")?,
        created_at: timestamp(c, doc, "created_at")?,
    })
}

/// User accounts keyed by email.
pub struct UserRepository {
    store: Arc<dyn DocumentStore>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Register a user; fails with `AlreadyExists` when the email is taken.
    pub async fn create(&self, user: &User) -> StoreResult<()> {
        self.store
            .insert(collections::USERS, &user_doc_id(&user.email), user_to_fields(user))
            .await?;
        info!(account = %user.email, "Registered user");
        Ok(())
    }

    pub async fn find_by_email(&self, email: &AccountId) -> StoreResult<Option<User>> {
        self.store
            .get(collections::USERS, &user_doc_id(email))
            .await?
            .map(|doc| document_to_user(&doc))
            .transpose()
    }

    /// Replace the stored password digest. Returns false for unknown users.
    pub async fn update_password(
        &self,
        email: &AccountId,
        password_hash: String,
    ) -> StoreResult<bool> {
        let Some(mut user) = self.find_by_email(email).await? else {
            return Ok(false);
        };
        user.password_hash = password_hash;
        self.store
            .upsert(collections::USERS, &user_doc_id(email), user_to_fields(&user))
            .await?;
        info!(account = %email, "Password reset");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{hash_password, verify_password};
    use crate::memory::MemoryStore;
    use cg_models::{NewGuard, UpsertCamera};

    fn account(s: &str) -> AccountId {
        AccountId::parse(s).unwrap()
    }

    fn guard(owner: &str, name: &str, gate: &str) -> Guard {
        NewGuard {
            user_email: owner.to_string(),
            name: name.to_string(),
            mobile: "9876543210".to_string(),
            gate: gate.to_string(),
            status: None,
        }
        .into_guard()
        .unwrap()
    }

    fn camera(owner: &str, gate: &str, url: &str) -> Camera {
        UpsertCamera {
            user_email: owner.to_string(),
            gate: gate.to_string(),
            rtsp_url: url.to_string(),
            status: None,
        }
        .into_camera()
        .unwrap()
    }

    #[tokio::test]
    async fn test_guards_are_isolated_per_account() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let repo_a = GuardRepository::new(store.clone(), account("a@x.in"));
        let repo_b = GuardRepository::new(store.clone(), account("b@x.in"));

        let g = guard("a@x.in", "Ravi", "GateA");
        repo_a.create(&g).await.unwrap();

        assert_eq!(repo_a.list().await.unwrap().len(), 1);
        assert!(repo_b.list().await.unwrap().is_empty());
        assert!(repo_b.get(&g.id).await.unwrap().is_none());
        assert!(!repo_b.delete(&g.id).await.unwrap());
        assert_eq!(repo_a.list().await.unwrap().len(), 1);
        assert!(repo_a.delete(&g.id).await.unwrap());
        assert!(repo_a.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_foreign_guard() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let repo = GuardRepository::new(store, account("a@x.in"));
        let err = repo.create(&guard("b@x.in", "Ravi", "GateA")).await.unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_list_for_gate_filters() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let repo = GuardRepository::new(store, account("a@x.in"));
        repo.create(&guard("a@x.in", "Ravi", "GateA")).await.unwrap();
        repo.create(&guard("a@x.in", "Meena", "GateB")).await.unwrap();

        let at_a = repo.list_for_gate("GateA").await.unwrap();
        assert_eq!(at_a.len(), 1);
        assert_eq!(at_a[0].name, "Ravi");
        assert_eq!(at_a[0].status, GuardStatus::Active);
    }

    #[tokio::test]
    async fn test_camera_upsert_replaces() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let repo = CameraRepository::new(store.clone(), account("a@x.in"));
        repo.upsert(&camera("a@x.in", "GateA", "0")).await.unwrap();
        repo.upsert(&camera("a@x.in", "GateA", "rtsp://10.0.0.9/live")).await.unwrap();

        let cameras = repo.list().await.unwrap();
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].rtsp_url, "rtsp://10.0.0.9/live");

        let other = CameraRepository::new(store, account("b@x.in"));
        assert!(other.get("GateA").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_gate_settings_roundtrip() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let repo = GateSettingsRepository::new(store, account("a@x.in"));
        assert!(repo.get("GateA").await.unwrap().is_none());
        repo.set_threshold("GateA", 10).await.unwrap();
        assert_eq!(repo.get("GateA").await.unwrap().unwrap().alert_threshold, 10);
    }

    #[tokio::test]
    async fn test_users_unique_and_password_update() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let repo = UserRepository::new(store);
        let user = User {
            name: "Asha".to_string(),
            email: account("asha@x.in"),
            mobile: "9876543210".to_string(),
            password_hash: hash_password("secret1").unwrap(),
            created_at: Utc::now(),
        };
        repo.create(&user).await.unwrap();
        assert!(matches!(repo.create(&user).await, Err(StoreError::AlreadyExists(_))));

        let new_hash = hash_password("secret2").unwrap();
        assert!(repo.update_password(&user.email, new_hash).await.unwrap());
        let stored = repo.find_by_email(&user.email).await.unwrap().unwrap();
        assert!(verify_password("secret2", &stored.password_hash));
        let nobody = account("nobody@x.in");
        assert!(!repo.update_password(&nobody, hash_password("x").unwrap()).await.unwrap());
    }
}
