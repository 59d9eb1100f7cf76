//! scene-sync: world-object replication for a shared, server-mediated 3D scene.
//!
//! Each participant holds a local replica set of named world objects and
//! keeps it consistent with an authoritative remote store. This crate
//! provides:
//! - The property codec (typed values ↔ name → binary-blob property sets)
//! - The entity directory (one local replica per name)
//! - RemoteStore and NotificationChannel trait abstractions, with in-memory
//!   implementations for tests and in-process demos
//! - The synchronization engine: entity lifecycle, remote-notification
//!   handling, and automatic outward push of local edits

pub mod channel;
pub mod codec;
pub mod directory;
pub mod engine;
pub mod entity;
pub mod events;
pub mod object;
pub mod reporter;
pub mod store;

pub use channel::{InMemoryChannel, NotificationChannel, RemoteEvent};
pub use codec::{BitmapCodec, BitmapPayload, FormatTable, MeshCodec, MeshPayload, PixelFormat};
pub use directory::EntityDirectory;
pub use engine::{EngineError, EventClass, SyncEngine};
pub use entity::{
    EntityRecord, PropertySet, Quat, Transform, TransformRecord, UpdateRecord, Vec3,
};
pub use events::{EventBus, SceneEvent, Subscription};
pub use object::{BasicObject, ObjectRegistry, WorldObject};
pub use reporter::{ChangeReporter, LocalChange, ReporterSubscription};
pub use store::{InMemoryStore, RemoteStore, StoreError};
