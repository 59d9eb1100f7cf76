//! Local signal bus.
//!
//! The engine raises a [`SceneEvent`] after it applies a remote-originated
//! change, so presentation code can react (spawn/despawn visuals, refresh a
//! decoded mesh) without polling the directory. Subscriptions follow the
//! disposer pattern: drop the [`Subscription`] to unsubscribe.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// A change the engine applied to the local replica set.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SceneEvent {
    /// A remote entity was fetched and registered locally.
    EntityAdded { name: String },
    /// A local replica was deregistered after a remote removal.
    EntityRemoved { name: String },
    /// Full state (frame + properties) re-applied from a fetched record.
    EntityUpdated { name: String },
    /// Property set re-applied; spatial frame untouched.
    EntityPropertiesUpdated { name: String },
    /// Spatial frame re-applied from an inline transform record.
    EntityTransformed { name: String },
}

impl SceneEvent {
    pub fn name(&self) -> &str {
        match self {
            SceneEvent::EntityAdded { name }
            | SceneEvent::EntityRemoved { name }
            | SceneEvent::EntityUpdated { name }
            | SceneEvent::EntityPropertiesUpdated { name }
            | SceneEvent::EntityTransformed { name } => name,
        }
    }
}

/// Subscription handle that unsubscribes automatically when dropped.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Event bus publishing [`SceneEvent`]s to subscribers.
///
/// Thread-safe; wrap in `Arc` to enable subscriptions.
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Arc<dyn Fn(SceneEvent) + Send + Sync>)>>,
    next_id: AtomicUsize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns a [`Subscription`] that unsubscribes on
    /// drop. Requires `self` to be wrapped in `Arc`.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(SceneEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // try_write avoids deadlock if Drop runs during panic unwinding while
        // a read lock is held (e.g. during emit).
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: SceneEvent) {
        // Clone the callback list so a callback may subscribe without deadlock.
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_and_emit() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let _sub = bus.subscribe(move |event| {
            assert_eq!(event.name(), "Box1");
            count_clone.fetch_add(1, Ordering::Relaxed);
        });

        bus.emit(SceneEvent::EntityAdded { name: "Box1".into() });
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_subscription_unsubscribes_on_drop() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        {
            let _sub = bus.subscribe(move |_| {
                count_clone.fetch_add(1, Ordering::Relaxed);
            });
            bus.emit(SceneEvent::EntityRemoved { name: "Box1".into() });
            assert_eq!(count.load(Ordering::Relaxed), 1);
        }

        bus.emit(SceneEvent::EntityRemoved { name: "Box2".into() });
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_event_serialization() {
        let event = SceneEvent::EntityPropertiesUpdated { name: "Box1".into() };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"entityPropertiesUpdated\""));
        assert!(json.contains("\"name\":\"Box1\""));
    }
}
