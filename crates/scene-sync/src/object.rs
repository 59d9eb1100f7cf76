//! Local replica handles.
//!
//! A [`WorldObject`] is the engine-facing capability of a replicated entity:
//! identity, spatial frame, property encoding/decoding for its type tag, and
//! a [`ChangeReporter`] the engine subscribes to. Presentation-layer handles
//! (render meshes, textures) implement this trait outside this crate;
//! [`BasicObject`] is the plain in-memory implementation used by tests and
//! the demo client.
//!
//! Type-tag dispatch is an open registration table ([`ObjectRegistry`])
//! because the tag set is extensible (meshes, bitmaps, avatar parts, ...).

use crate::codec::CodecError;
use crate::entity::{EntityRecord, PropertySet, Transform};
use crate::reporter::{ChangeReporter, LocalChange};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("Object '{name}' lacks property management for kind '{kind}'")]
    MissingCapability { name: String, kind: String },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, ObjectError>;

/// Engine-facing handle of a local replica.
///
/// Methods take `&self`: implementations use interior mutability so handles
/// can be shared between the engine's spawned notification handlers. Once a
/// handle is given to the engine it is engine-managed until removed or
/// replaced; callers must not change its name while registered.
pub trait WorldObject: Send + Sync {
    /// Globally unique entity name.
    fn name(&self) -> String;

    /// Type tag selecting the property schema.
    fn kind(&self) -> String;

    fn transform(&self) -> Transform;

    /// Apply a remote-originated transform. Must not fire the reporter.
    fn set_transform(&self, transform: Transform);

    /// Encode the current payload into a property set.
    fn encode_properties(&self) -> Result<PropertySet>;

    /// Apply a remote-originated property set. Must not fire the reporter.
    fn apply_properties(&self, properties: &PropertySet) -> Result<()>;

    /// The change reporter the engine subscribes to after registration.
    fn reporter(&self) -> ChangeReporter;

    /// Snapshot the full wire record for this replica.
    fn record(&self) -> Result<EntityRecord> {
        let transform = self.transform();
        Ok(EntityRecord {
            name: self.name(),
            position: transform.position,
            rotation: transform.rotation,
            scale: transform.scale,
            kind: self.kind(),
            properties: self.encode_properties()?,
        })
    }
}

struct BasicState {
    transform: Transform,
    properties: PropertySet,
}

/// Plain in-memory [`WorldObject`]: stores the transform and property set it
/// is given. Local edits go through [`BasicObject::edit_transform`] /
/// [`BasicObject::edit_properties`], which fire the reporter.
pub struct BasicObject {
    name: String,
    kind: String,
    state: Mutex<BasicState>,
    reporter: ChangeReporter,
}

impl BasicObject {
    pub fn new(name: &str, kind: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            kind: kind.to_string(),
            state: Mutex::new(BasicState {
                transform: Transform::default(),
                properties: PropertySet::new(),
            }),
            reporter: ChangeReporter::new(),
        })
    }

    /// Build a replica from a fetched record.
    pub fn from_record(record: &EntityRecord) -> Arc<Self> {
        Arc::new(Self {
            name: record.name.clone(),
            kind: record.kind.clone(),
            state: Mutex::new(BasicState {
                transform: record.transform(),
                properties: record.properties.clone(),
            }),
            reporter: ChangeReporter::new(),
        })
    }

    /// Local transform edit: applies and fires the reporter.
    pub fn edit_transform(&self, transform: Transform) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).transform = transform;
        self.reporter.report(LocalChange::Transform);
    }

    /// Local property edit: applies and fires the reporter.
    pub fn edit_properties(&self, properties: PropertySet) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .properties = properties;
        self.reporter.report(LocalChange::Properties);
    }

    /// Snapshot of the current property set.
    pub fn properties(&self) -> PropertySet {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .properties
            .clone()
    }
}

impl WorldObject for BasicObject {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn kind(&self) -> String {
        self.kind.clone()
    }

    fn transform(&self) -> Transform {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).transform
    }

    fn set_transform(&self, transform: Transform) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).transform = transform;
    }

    fn encode_properties(&self) -> Result<PropertySet> {
        Ok(self.properties())
    }

    fn apply_properties(&self, properties: &PropertySet) -> Result<()> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .properties = properties.clone();
        Ok(())
    }

    fn reporter(&self) -> ChangeReporter {
        self.reporter.clone()
    }
}

/// Factory instantiating a local replica from a fetched record.
pub type ObjectFactory =
    Box<dyn Fn(&EntityRecord) -> Result<Arc<dyn WorldObject>> + Send + Sync>;

/// Open type tag → factory table.
///
/// Records whose tag has no registered factory produce no local replica; the
/// engine logs and skips them rather than failing the batch.
#[derive(Default)]
pub struct ObjectRegistry {
    factories: HashMap<String, ObjectFactory>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a type tag. Later registrations win.
    pub fn register(
        &mut self,
        kind: &str,
        factory: impl Fn(&EntityRecord) -> Result<Arc<dyn WorldObject>> + Send + Sync + 'static,
    ) {
        self.factories.insert(kind.to_string(), Box::new(factory));
    }

    /// Register [`BasicObject`] for a type tag.
    pub fn register_basic(&mut self, kind: &str) {
        self.register(kind, |record| {
            Ok(BasicObject::from_record(record) as Arc<dyn WorldObject>)
        });
    }

    pub fn knows(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Instantiate a replica for `record`, or `None` for an unknown tag.
    pub fn instantiate(&self, record: &EntityRecord) -> Option<Result<Arc<dyn WorldObject>>> {
        self.factories.get(&record.kind).map(|f| f(record))
    }
}
