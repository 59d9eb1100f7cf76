//! EntityDirectory: local registry of entity name → replica handle.
//!
//! The directory is the only shared mutable resource in the engine core and
//! serializes access internally, since notification handlers run on spawned
//! tasks. It enforces at-most-one replica per name: `store` refuses
//! duplicates, swapping an entry requires the explicit `replace`.

use crate::object::WorldObject;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Entity name already registered: {0}")]
    DuplicateName(String),

    #[error("Unknown entity name: {0}")]
    UnknownName(String),
}

pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Name → handle registry enforcing the one-replica-per-name invariant.
#[derive(Default)]
pub struct EntityDirectory {
    entries: Mutex<HashMap<String, Arc<dyn WorldObject>>>,
}

impl EntityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle under its name. Returns false (and does not
    /// overwrite) if the name is already present.
    pub fn store(&self, handle: Arc<dyn WorldObject>) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.entry(handle.name()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn WorldObject>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Deregister and return the handle for caller-driven teardown.
    pub fn remove(&self, name: &str) -> Option<Arc<dyn WorldObject>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
    }

    /// Swap the stored handle for an existing name, returning the previous
    /// one. Fails if the name is not registered.
    pub fn replace(&self, handle: Arc<dyn WorldObject>) -> Result<Arc<dyn WorldObject>> {
        let name = handle.name();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get_mut(&name) {
            Some(slot) => Ok(std::mem::replace(slot, handle)),
            None => Err(DirectoryError::UnknownName(name)),
        }
    }

    pub fn is_stored(&self, name: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    /// Remove every entry, returning the handles. Used on full resync; the
    /// caller destroys the returned handles.
    pub fn clear_all(&self) -> Vec<Arc<dyn WorldObject>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, handle)| handle)
            .collect()
    }

    /// Snapshot of registered names.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::BasicObject;

    #[test]
    fn test_store_rejects_duplicates() {
        let directory = EntityDirectory::new();
        assert!(directory.store(BasicObject::new("Box1", "Mesh")));
        assert!(!directory.store(BasicObject::new("Box1", "Mesh")));
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_remove_returns_handle() {
        let directory = EntityDirectory::new();
        directory.store(BasicObject::new("Box1", "Mesh"));

        let removed = directory.remove("Box1").unwrap();
        assert_eq!(removed.name(), "Box1");
        assert!(!directory.is_stored("Box1"));
        assert!(directory.remove("Box1").is_none());
    }

    #[test]
    fn test_replace_requires_existing_entry() {
        let directory = EntityDirectory::new();

        let err = directory.replace(BasicObject::new("Box1", "Mesh"));
        assert!(matches!(err, Err(DirectoryError::UnknownName(_))));

        directory.store(BasicObject::new("Box1", "Mesh"));
        let old = directory.replace(BasicObject::new("Box1", "Bitmap")).unwrap();
        assert_eq!(old.kind(), "Mesh");
        assert_eq!(directory.get("Box1").unwrap().kind(), "Bitmap");
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_clear_all_returns_every_handle() {
        let directory = EntityDirectory::new();
        directory.store(BasicObject::new("Box1", "Mesh"));
        directory.store(BasicObject::new("Box2", "Mesh"));

        let removed = directory.clear_all();
        assert_eq!(removed.len(), 2);
        assert!(directory.is_empty());
    }

    #[test]
    fn test_uniqueness_across_mixed_operations() {
        // At any point, at most one handle per name.
        let directory = EntityDirectory::new();

        directory.store(BasicObject::new("X", "Mesh"));
        assert!(!directory.store(BasicObject::new("X", "Mesh")));
        directory.replace(BasicObject::new("X", "Mesh")).unwrap();
        assert_eq!(directory.len(), 1);

        directory.remove("X");
        assert!(directory.store(BasicObject::new("X", "Mesh")));
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.names(), vec!["X".to_string()]);
    }
}
