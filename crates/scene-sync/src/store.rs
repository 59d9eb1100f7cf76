//! Remote data gateway: request/response operations against the
//! authoritative store.
//!
//! Implementations:
//! - `InMemoryStore` - for tests and the in-process demo client
//! - real deployments implement [`RemoteStore`] over their session/RPC layer
//!
//! Every operation is an independently failing remote call; failures are
//! retryable by the caller, never retried by the engine.

use crate::channel::RemoteEvent;
use crate::entity::{EntityRecord, PropertySet, TransformRecord, UpdateRecord};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Entity not found in remote store: {0}")]
    NotFound(String),

    #[error("Entity already exists in remote store: {0}")]
    AlreadyExists(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Remote call timed out: {0}")]
    Timeout(String),

    #[error("Store error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Request/response surface of the authoritative remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn add_entity(&self, record: &EntityRecord) -> Result<()>;

    async fn remove_entity(&self, name: &str) -> Result<()>;

    async fn get_entity(&self, name: &str) -> Result<EntityRecord>;

    async fn get_all_entities(&self) -> Result<Vec<EntityRecord>>;

    async fn get_properties(&self, name: &str) -> Result<PropertySet>;

    async fn update_entity(&self, name: &str, update: &UpdateRecord) -> Result<()>;

    async fn update_properties(&self, name: &str, properties: &PropertySet) -> Result<()>;

    /// Push a spatial frame only. Outbound counterpart of the
    /// `Transformed` notification.
    async fn update_transform(&self, record: &TransformRecord) -> Result<()>;
}

// Forward through Arc so a store can be shared between engines in tests.
#[async_trait]
impl<T: RemoteStore> RemoteStore for std::sync::Arc<T> {
    async fn add_entity(&self, record: &EntityRecord) -> Result<()> {
        (**self).add_entity(record).await
    }

    async fn remove_entity(&self, name: &str) -> Result<()> {
        (**self).remove_entity(name).await
    }

    async fn get_entity(&self, name: &str) -> Result<EntityRecord> {
        (**self).get_entity(name).await
    }

    async fn get_all_entities(&self) -> Result<Vec<EntityRecord>> {
        (**self).get_all_entities().await
    }

    async fn get_properties(&self, name: &str) -> Result<PropertySet> {
        (**self).get_properties(name).await
    }

    async fn update_entity(&self, name: &str, update: &UpdateRecord) -> Result<()> {
        (**self).update_entity(name, update).await
    }

    async fn update_properties(&self, name: &str, properties: &PropertySet) -> Result<()> {
        (**self).update_properties(name, properties).await
    }

    async fn update_transform(&self, record: &TransformRecord) -> Result<()> {
        (**self).update_transform(record).await
    }
}

/// One recorded gateway call, for interaction assertions in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Add(String),
    Remove(String),
    GetEntity(String),
    GetAll,
    GetProperties(String),
    Update(String),
    UpdateProperties(String),
    UpdateTransform(String),
}

/// In-memory authoritative store.
///
/// Holds the record map behind an `RwLock`, records every call, and fans
/// mutations out as [`RemoteEvent`]s to every attached channel sender —
/// including the originator's, mirroring a server that echoes notifications
/// back to the editing participant.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, EntityRecord>>,
    calls: Mutex<Vec<StoreCall>>,
    notifiers: Mutex<Vec<mpsc::UnboundedSender<RemoteEvent>>>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a notification sender; future mutations fan out to it.
    pub fn attach_notifier(&self, sender: mpsc::UnboundedSender<RemoteEvent>) {
        self.notifiers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sender);
    }

    /// Simulate connection loss: every call fails until restored.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Snapshot of the recorded calls.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Seed a record without recording a call or notifying, for test setup.
    pub fn seed(&self, record: EntityRecord) {
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record.name.clone(), record);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::Relaxed) {
            Err(StoreError::ConnectionFailed("store offline".into()))
        } else {
            Ok(())
        }
    }

    fn record_call(&self, call: StoreCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    fn notify(&self, event: RemoteEvent) {
        let mut notifiers = self.notifiers.lock().unwrap_or_else(|e| e.into_inner());
        notifiers.retain(|sender| sender.send(event.clone()).is_ok());
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn add_entity(&self, record: &EntityRecord) -> Result<()> {
        self.check_online()?;
        self.record_call(StoreCall::Add(record.name.clone()));

        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.contains_key(&record.name) {
            return Err(StoreError::AlreadyExists(record.name.clone()));
        }
        records.insert(record.name.clone(), record.clone());
        drop(records);

        self.notify(RemoteEvent::Added {
            name: record.name.clone(),
        });
        Ok(())
    }

    async fn remove_entity(&self, name: &str) -> Result<()> {
        self.check_online()?;
        self.record_call(StoreCall::Remove(name.to_string()));

        let removed = self
            .records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
        if removed.is_none() {
            return Err(StoreError::NotFound(name.to_string()));
        }

        self.notify(RemoteEvent::Removed {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn get_entity(&self, name: &str) -> Result<EntityRecord> {
        self.check_online()?;
        self.record_call(StoreCall::GetEntity(name.to_string()));

        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn get_all_entities(&self) -> Result<Vec<EntityRecord>> {
        self.check_online()?;
        self.record_call(StoreCall::GetAll);

        Ok(self
            .records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect())
    }

    async fn get_properties(&self, name: &str) -> Result<PropertySet> {
        self.check_online()?;
        self.record_call(StoreCall::GetProperties(name.to_string()));

        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|record| record.properties.clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn update_entity(&self, name: &str, update: &UpdateRecord) -> Result<()> {
        self.check_online()?;
        self.record_call(StoreCall::Update(name.to_string()));

        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = records
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        record.position = update.position;
        record.rotation = update.rotation;
        record.scale = update.scale;
        record.kind = update.kind.clone();
        record.properties = update.properties.clone();
        drop(records);

        self.notify(RemoteEvent::Updated {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn update_properties(&self, name: &str, properties: &PropertySet) -> Result<()> {
        self.check_online()?;
        self.record_call(StoreCall::UpdateProperties(name.to_string()));

        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = records
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        record.properties = properties.clone();
        drop(records);

        self.notify(RemoteEvent::PropertiesUpdated {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn update_transform(&self, transform: &TransformRecord) -> Result<()> {
        self.check_online()?;
        self.record_call(StoreCall::UpdateTransform(transform.name.clone()));

        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = records
            .get_mut(&transform.name)
            .ok_or_else(|| StoreError::NotFound(transform.name.clone()))?;
        record.position = transform.position;
        record.rotation = transform.rotation;
        record.scale = transform.scale;
        drop(records);

        self.notify(RemoteEvent::Transformed(transform.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Transform, Vec3};

    fn record(name: &str) -> EntityRecord {
        EntityRecord {
            name: name.to_string(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            kind: "Mesh".into(),
            properties: PropertySet::new(),
        }
    }

    #[tokio::test]
    async fn test_add_get_remove() {
        let store = InMemoryStore::new();
        store.add_entity(&record("Box1")).await.unwrap();

        let fetched = store.get_entity("Box1").await.unwrap();
        assert_eq!(fetched.name, "Box1");

        store.remove_entity("Box1").await.unwrap();
        assert!(matches!(
            store.get_entity("Box1").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_add_fails() {
        let store = InMemoryStore::new();
        store.add_entity(&record("Box1")).await.unwrap();
        assert!(matches!(
            store.add_entity(&record("Box1")).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_update_transform_leaves_properties() {
        let store = InMemoryStore::new();
        let mut seeded = record("Box1");
        seeded.properties.insert("Primitive".into(), b"Triangles".to_vec());
        store.seed(seeded);

        let transform = TransformRecord::new(
            "Box1",
            Transform {
                position: Vec3::new(5.0, 0.0, 0.0),
                ..Transform::default()
            },
        );
        store.update_transform(&transform).await.unwrap();

        let fetched = store.get_entity("Box1").await.unwrap();
        assert_eq!(fetched.position, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(fetched.properties["Primitive"], b"Triangles");
    }

    #[tokio::test]
    async fn test_calls_are_recorded() {
        let store = InMemoryStore::new();
        store.add_entity(&record("Box1")).await.unwrap();
        store.get_properties("Box1").await.unwrap();

        assert_eq!(
            store.calls(),
            vec![
                StoreCall::Add("Box1".into()),
                StoreCall::GetProperties("Box1".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let store = InMemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.add_entity(&record("Box1")).await,
            Err(StoreError::ConnectionFailed(_))
        ));
        store.set_offline(false);
        store.add_entity(&record("Box1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_mutations_fan_out_to_notifiers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let store = InMemoryStore::new();
        store.attach_notifier(tx);

        store.add_entity(&record("Box1")).await.unwrap();
        store.remove_entity("Box1").await.unwrap();

        assert!(matches!(rx.recv().await, Some(RemoteEvent::Added { .. })));
        assert!(matches!(rx.recv().await, Some(RemoteEvent::Removed { .. })));
    }
}
