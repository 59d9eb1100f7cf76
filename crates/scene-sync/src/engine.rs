//! SyncEngine: keeps the local replica set consistent with the remote store.
//!
//! The engine wires the entity directory, remote store and notification
//! channel together:
//!
//! 1. Application code adds/updates/removes replicas through the engine,
//!    which pushes the change to the remote store and only commits it locally
//!    after the store acknowledges.
//! 2. After registration the engine subscribes the replica's change reporter,
//!    so further local edits are pushed outward automatically.
//! 3. Remote notifications are dispatched as independent tasks that fetch and
//!    apply the corresponding state, guarded by directory membership checks
//!    so stale completions never resurrect deleted entities.
//!
//! There is no cross-entity ordering and no merge: last writer wins. Store
//! failures inside notification handlers are logged and leave the directory
//! untouched; failures inside application-invoked operations propagate.

use crate::channel::{NotificationChannel, RemoteEvent};
use crate::directory::EntityDirectory;
use crate::entity::TransformRecord;
use crate::events::{EventBus, SceneEvent};
use crate::object::{ObjectError, ObjectRegistry, WorldObject};
use crate::reporter::{LocalChange, ReporterSubscription};
use crate::store::{RemoteStore, StoreError};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Entity name already registered locally: {0}")]
    DuplicateName(String),

    #[error("Unknown entity name: {0}")]
    UnknownName(String),

    #[error("Object error: {0}")]
    Object(#[from] ObjectError),

    #[error("Remote store call failed: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Remote event classes, for per-class reaction toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    Added,
    Removed,
    Updated,
    PropertiesUpdated,
    Transformed,
}

impl EventClass {
    fn of(event: &RemoteEvent) -> Self {
        match event {
            RemoteEvent::Added { .. } => EventClass::Added,
            RemoteEvent::Removed { .. } => EventClass::Removed,
            RemoteEvent::Updated { .. } => EventClass::Updated,
            RemoteEvent::PropertiesUpdated { .. } => EventClass::PropertiesUpdated,
            RemoteEvent::Transformed(_) => EventClass::Transformed,
        }
    }
}

/// Per-event-class reaction flags, plus a global suspension gate used during
/// a resync window so in-flight notifications cannot double-process state the
/// full reload is about to subsume.
pub struct Reactions {
    added: AtomicBool,
    removed: AtomicBool,
    updated: AtomicBool,
    properties_updated: AtomicBool,
    transformed: AtomicBool,
    suspended: AtomicBool,
}

impl Default for Reactions {
    fn default() -> Self {
        Self {
            added: AtomicBool::new(true),
            removed: AtomicBool::new(true),
            updated: AtomicBool::new(true),
            properties_updated: AtomicBool::new(true),
            transformed: AtomicBool::new(true),
            suspended: AtomicBool::new(false),
        }
    }
}

impl Reactions {
    fn flag(&self, class: EventClass) -> &AtomicBool {
        match class {
            EventClass::Added => &self.added,
            EventClass::Removed => &self.removed,
            EventClass::Updated => &self.updated,
            EventClass::PropertiesUpdated => &self.properties_updated,
            EventClass::Transformed => &self.transformed,
        }
    }

    /// Enable or disable reaction to one event class.
    pub fn set(&self, class: EventClass, enabled: bool) {
        self.flag(class).store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self, class: EventClass) -> bool {
        !self.suspended.load(Ordering::Relaxed) && self.flag(class).load(Ordering::Relaxed)
    }

    fn suspend(&self) {
        self.suspended.store(true, Ordering::Relaxed);
    }

    fn resume(&self) {
        self.suspended.store(false, Ordering::Relaxed);
    }
}

/// Echo classes tracked for self-originated notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EchoClass {
    Updated,
    Properties,
    Transform,
}

/// Flags expire so a dropped notification cannot leave a stale mark that
/// would suppress a genuine remote update later.
const ECHO_TTL: Duration = Duration::from_secs(5);

/// Tracks names whose outbound push originated here, so the store's
/// reflected notification is consumed instead of re-applied.
///
/// The mark is set before the outbound call; the matching notification
/// handler checks and consumes it.
#[derive(Default)]
struct EchoTracker {
    marks: Mutex<HashMap<(String, EchoClass), Instant>>,
}

impl EchoTracker {
    fn mark(&self, name: &str, class: EchoClass) {
        let mut marks = self.marks.lock().unwrap_or_else(|e| e.into_inner());
        // Marks for pushes that never got a notification expire; drop them
        // here so the map cannot grow unbounded.
        marks.retain(|_, stamp| stamp.elapsed() < ECHO_TTL);
        marks.insert((name.to_string(), class), Instant::now());
    }

    /// Remove a mark whose outbound push failed, so no reflected
    /// notification is coming and a genuine remote update must be applied.
    fn clear(&self, name: &str, class: EchoClass) {
        self.marks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(name.to_string(), class));
    }

    /// Check and consume the mark (returns true once, false if expired).
    fn consume(&self, name: &str, class: EchoClass) -> bool {
        let mut marks = self.marks.lock().unwrap_or_else(|e| e.into_inner());
        match marks.remove(&(name.to_string(), class)) {
            Some(stamp) => stamp.elapsed() < ECHO_TTL,
            None => false,
        }
    }
}

/// The world-object synchronization engine.
///
/// All dependencies are constructor-injected; lifecycle is explicit
/// ([`SyncEngine::new`] / [`SyncEngine::run`] / [`SyncEngine::shutdown`]).
pub struct SyncEngine {
    directory: EntityDirectory,
    store: Arc<dyn RemoteStore>,
    registry: ObjectRegistry,
    events: Arc<EventBus>,
    reactions: Reactions,
    echoes: EchoTracker,
    /// Active reporter subscriptions, indexed by entity name so that
    /// remove/replace can detach deterministically.
    subscriptions: Mutex<HashMap<String, ReporterSubscription>>,
    stop: Notify,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn RemoteStore>, registry: ObjectRegistry) -> Arc<Self> {
        Arc::new(Self {
            directory: EntityDirectory::new(),
            store,
            registry,
            events: Arc::new(EventBus::new()),
            reactions: Reactions::default(),
            echoes: EchoTracker::default(),
            subscriptions: Mutex::new(HashMap::new()),
            stop: Notify::new(),
        })
    }

    pub fn directory(&self) -> &EntityDirectory {
        &self.directory
    }

    /// Local signal bus; subscribe to observe applied remote changes.
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn reactions(&self) -> &Reactions {
        &self.reactions
    }

    // ------------------------------------------------------------------
    // Application-invoked operations
    // ------------------------------------------------------------------

    /// Register a local replica: push the full record to the remote store,
    /// then store the handle and subscribe its reporter.
    ///
    /// The duplicate-name check runs before the remote call, so a duplicate
    /// never creates a remote-only orphan.
    pub async fn add_entity(self: &Arc<Self>, handle: Arc<dyn WorldObject>) -> Result<()> {
        let name = handle.name();
        if self.directory.is_stored(&name) {
            return Err(EngineError::DuplicateName(name));
        }

        let record = handle.record()?;
        self.store.add_entity(&record).await?;

        if !self.directory.store(Arc::clone(&handle)) {
            // Another path registered the name during the remote call.
            warn!("'{}' registered concurrently, keeping the first replica", name);
            return Err(EngineError::DuplicateName(name));
        }
        self.subscribe_reporter(&name, handle.as_ref());
        debug!("added entity '{}'", name);
        Ok(())
    }

    /// Remove an entity remotely and locally. The directory entry remains if
    /// the remote delete fails.
    pub async fn remove_entity(&self, name: &str) -> Result<()> {
        if !self.directory.is_stored(name) {
            return Err(EngineError::UnknownName(name.to_string()));
        }

        self.store.remove_entity(name).await?;

        self.detach_reporter(name);
        self.directory.remove(name);
        debug!("removed entity '{}'", name);
        Ok(())
    }

    /// Re-push the current full state of a registered entity.
    pub async fn update_entity(&self, name: &str) -> Result<()> {
        let handle = self
            .directory
            .get(name)
            .ok_or_else(|| EngineError::UnknownName(name.to_string()))?;
        let record = handle.record()?;

        self.echoes.mark(name, EchoClass::Updated);
        if let Err(e) = self.store.update_entity(name, &record.to_update()).await {
            self.echoes.clear(name, EchoClass::Updated);
            return Err(e.into());
        }
        Ok(())
    }

    /// Push the current property set only; the spatial frame is untouched.
    pub async fn update_properties(&self, name: &str) -> Result<()> {
        let handle = self
            .directory
            .get(name)
            .ok_or_else(|| EngineError::UnknownName(name.to_string()))?;
        let properties = handle.encode_properties()?;

        self.echoes.mark(name, EchoClass::Properties);
        if let Err(e) = self.store.update_properties(name, &properties).await {
            self.echoes.clear(name, EchoClass::Properties);
            return Err(e.into());
        }
        Ok(())
    }

    /// Swap the local replica for an already-registered name: pushes the new
    /// state, detaches the old reporter, replaces the directory entry and
    /// subscribes the new reporter. Returns the previous handle for
    /// caller-driven teardown.
    pub async fn replace_entity(
        self: &Arc<Self>,
        handle: Arc<dyn WorldObject>,
    ) -> Result<Arc<dyn WorldObject>> {
        let name = handle.name();
        if !self.directory.is_stored(&name) {
            return Err(EngineError::UnknownName(name));
        }

        let record = handle.record()?;
        self.echoes.mark(&name, EchoClass::Updated);
        if let Err(e) = self.store.update_entity(&name, &record.to_update()).await {
            self.echoes.clear(&name, EchoClass::Updated);
            return Err(e.into());
        }

        self.detach_reporter(&name);
        let old = self
            .directory
            .replace(Arc::clone(&handle))
            .map_err(|_| EngineError::UnknownName(name.clone()))?;
        self.subscribe_reporter(&name, handle.as_ref());
        Ok(old)
    }

    /// Full resync: discard every local replica and rebuild the directory
    /// from the remote store's current record set.
    ///
    /// Reactions are suspended for the window so notifications about state
    /// the reload subsumes are not double-processed. A per-record
    /// instantiation failure or unknown type tag is logged and skipped; it
    /// never aborts the batch. Returns the number of replicas registered.
    pub async fn load_all_from_remote(self: &Arc<Self>) -> Result<usize> {
        self.reactions.suspend();
        let result = self.resync().await;
        self.reactions.resume();
        result
    }

    async fn resync(self: &Arc<Self>) -> Result<usize> {
        self.clear_all();

        let records = self.store.get_all_entities().await?;
        let mut registered = 0;

        for record in records {
            match self.registry.instantiate(&record) {
                None => {
                    debug!("no factory for kind '{}', skipping '{}'", record.kind, record.name);
                }
                Some(Err(e)) => {
                    warn!("failed to instantiate '{}': {}", record.name, e);
                }
                Some(Ok(handle)) => {
                    if self.directory.store(Arc::clone(&handle)) {
                        self.subscribe_reporter(&record.name, handle.as_ref());
                        registered += 1;
                    }
                }
            }
        }

        debug!("resync registered {} replica(s)", registered);
        Ok(registered)
    }

    /// Deregister everything: detach every reporter and return the removed
    /// handles so the caller can release display resources.
    pub fn clear_all(&self) -> Vec<Arc<dyn WorldObject>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.directory.clear_all()
    }

    // ------------------------------------------------------------------
    // Notification dispatch
    // ------------------------------------------------------------------

    /// Drive the notification dispatch loop until the channel closes or
    /// [`SyncEngine::shutdown`] is called. Each event is handled on its own
    /// task; handler failures are logged, never fatal to the loop.
    pub async fn run(self: &Arc<Self>, channel: impl NotificationChannel) {
        loop {
            tokio::select! {
                _ = self.stop.notified() => break,
                event = channel.recv() => match event {
                    Ok(event) => {
                        let engine = Arc::clone(self);
                        tokio::spawn(async move {
                            if let Err(e) = engine.handle_remote_event(event).await {
                                warn!("notification handler failed: {}", e);
                            }
                        });
                    }
                    Err(_) => break,
                },
            }
        }
        debug!("notification loop stopped");
    }

    /// Stop the dispatch loop.
    pub fn shutdown(&self) {
        // notify_one stores a permit, so shutdown is not lost if the loop is
        // mid-dispatch rather than parked on notified().
        self.stop.notify_one();
    }

    /// Apply one remote notification.
    ///
    /// Every fetch-then-apply path re-checks directory membership after its
    /// suspension point, since the entity may have been deleted by another
    /// participant while the fetch was in flight.
    pub async fn handle_remote_event(self: &Arc<Self>, event: RemoteEvent) -> Result<()> {
        let class = EventClass::of(&event);
        if !self.reactions.is_enabled(class) {
            debug!("reaction to {:?} disabled, dropping event for '{}'", class, event.name());
            return Ok(());
        }

        match event {
            RemoteEvent::Added { name } => self.on_remote_added(&name).await,
            RemoteEvent::Removed { name } => {
                self.on_remote_removed(&name);
                Ok(())
            }
            RemoteEvent::Updated { name } => self.on_remote_updated(&name).await,
            RemoteEvent::PropertiesUpdated { name } => {
                self.on_remote_properties_updated(&name).await
            }
            RemoteEvent::Transformed(record) => {
                self.on_remote_transformed(&record);
                Ok(())
            }
        }
    }

    async fn on_remote_added(self: &Arc<Self>, name: &str) -> Result<()> {
        // Idempotent against duplicate notifications and self-originated
        // echoes: an already-stored name means nothing to do.
        if self.directory.is_stored(name) {
            debug!("'{}' already stored, ignoring added notification", name);
            return Ok(());
        }

        let record = self.store.get_entity(name).await?;

        match self.registry.instantiate(&record) {
            None => {
                debug!("no factory for kind '{}', ignoring '{}'", record.kind, name);
                Ok(())
            }
            Some(Err(e)) => Err(e.into()),
            Some(Ok(handle)) => {
                if self.directory.store(Arc::clone(&handle)) {
                    self.subscribe_reporter(name, handle.as_ref());
                    self.events.emit(SceneEvent::EntityAdded {
                        name: name.to_string(),
                    });
                } else {
                    debug!("'{}' registered while fetch was in flight", name);
                }
                Ok(())
            }
        }
    }

    fn on_remote_removed(&self, name: &str) {
        match self.directory.remove(name) {
            Some(_handle) => {
                self.detach_reporter(name);
                self.events.emit(SceneEvent::EntityRemoved {
                    name: name.to_string(),
                });
            }
            None => debug!("'{}' not stored, ignoring removed notification", name),
        }
    }

    async fn on_remote_updated(self: &Arc<Self>, name: &str) -> Result<()> {
        if self.echoes.consume(name, EchoClass::Updated) {
            debug!("consumed update echo for '{}'", name);
            return Ok(());
        }
        if !self.directory.is_stored(name) {
            return Ok(());
        }

        let record = self.store.get_entity(name).await?;

        if let Some(handle) = self.directory.get(name) {
            handle.set_transform(record.transform());
            handle.apply_properties(&record.properties)?;
            self.events.emit(SceneEvent::EntityUpdated {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    async fn on_remote_properties_updated(self: &Arc<Self>, name: &str) -> Result<()> {
        if self.echoes.consume(name, EchoClass::Properties) {
            debug!("consumed properties echo for '{}'", name);
            return Ok(());
        }
        if !self.directory.is_stored(name) {
            return Ok(());
        }

        let properties = self.store.get_properties(name).await?;

        if let Some(handle) = self.directory.get(name) {
            handle.apply_properties(&properties)?;
            self.events.emit(SceneEvent::EntityPropertiesUpdated {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn on_remote_transformed(&self, record: &TransformRecord) {
        if self.echoes.consume(&record.name, EchoClass::Transform) {
            debug!("consumed transform echo for '{}'", record.name);
            return;
        }

        // The transform payload is self-contained; no fetch needed.
        if let Some(handle) = self.directory.get(&record.name) {
            handle.set_transform(record.transform());
            self.events.emit(SceneEvent::EntityTransformed {
                name: record.name.clone(),
            });
        }
    }

    // ------------------------------------------------------------------
    // Reporter wiring
    // ------------------------------------------------------------------

    fn subscribe_reporter(self: &Arc<Self>, name: &str, handle: &dyn WorldObject) {
        let weak = Arc::downgrade(self);
        let entity = name.to_string();

        let subscription = handle.reporter().subscribe(move |change| {
            let Some(engine) = weak.upgrade() else {
                return;
            };
            let entity = entity.clone();
            tokio::spawn(async move {
                let result = match change {
                    LocalChange::Properties => engine.push_properties(&entity).await,
                    LocalChange::Transform => engine.push_transform(&entity).await,
                };
                if let Err(e) = result {
                    warn!("failed to push local change for '{}': {}", entity, e);
                }
            });
        });

        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), subscription);
    }

    fn detach_reporter(&self, name: &str) {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
    }

    async fn push_properties(&self, name: &str) -> Result<()> {
        let Some(handle) = self.directory.get(name) else {
            // Removed between the edit and this task running.
            return Ok(());
        };
        let properties = handle.encode_properties()?;
        self.echoes.mark(name, EchoClass::Properties);
        if let Err(e) = self.store.update_properties(name, &properties).await {
            self.echoes.clear(name, EchoClass::Properties);
            return Err(e.into());
        }
        Ok(())
    }

    async fn push_transform(&self, name: &str) -> Result<()> {
        let Some(handle) = self.directory.get(name) else {
            return Ok(());
        };
        let record = TransformRecord::new(name, handle.transform());
        self.echoes.mark(name, EchoClass::Transform);
        if let Err(e) = self.store.update_transform(&record).await {
            self.echoes.clear(name, EchoClass::Transform);
            return Err(e.into());
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn has_subscription(&self, name: &str) -> bool {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }
}
