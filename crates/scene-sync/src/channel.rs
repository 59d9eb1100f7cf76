//! Remote notification channel.
//!
//! The authoritative store pushes remote-originated lifecycle events to every
//! participant. Events arrive in arbitrary order and at-most-approximately
//! once; the engine's handlers are written to tolerate duplicates and events
//! for entities that no longer exist.

use crate::entity::TransformRecord;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Notification channel closed")]
    Closed,

    #[error("Channel error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// A remote-originated lifecycle event, keyed by entity name (transforms
/// carry a self-contained record instead, so no follow-up fetch is needed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RemoteEvent {
    Added { name: String },
    Removed { name: String },
    Updated { name: String },
    PropertiesUpdated { name: String },
    Transformed(TransformRecord),
}

impl RemoteEvent {
    /// The entity name this event concerns.
    pub fn name(&self) -> &str {
        match self {
            RemoteEvent::Added { name }
            | RemoteEvent::Removed { name }
            | RemoteEvent::Updated { name }
            | RemoteEvent::PropertiesUpdated { name } => name,
            RemoteEvent::Transformed(record) => &record.name,
        }
    }
}

/// Push interface delivering remote lifecycle events.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Wait for the next event. Fails with [`ChannelError::Closed`] when the
    /// feed ends.
    async fn recv(&self) -> Result<RemoteEvent>;
}

/// In-process channel backed by a tokio mpsc queue.
///
/// Used by tests and by the in-memory store's fan-out; a real deployment
/// implements [`NotificationChannel`] over its session transport instead.
pub struct InMemoryChannel {
    receiver: Mutex<mpsc::UnboundedReceiver<RemoteEvent>>,
}

impl InMemoryChannel {
    /// A connected (sender, channel) pair.
    pub fn pair() -> (mpsc::UnboundedSender<RemoteEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                receiver: Mutex::new(rx),
            },
        )
    }
}

#[async_trait]
impl NotificationChannel for InMemoryChannel {
    async fn recv(&self) -> Result<RemoteEvent> {
        self.receiver
            .lock()
            .await
            .recv()
            .await
            .ok_or(ChannelError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Transform, Vec3};

    #[tokio::test]
    async fn test_pair_delivers_in_order() {
        let (tx, channel) = InMemoryChannel::pair();

        tx.send(RemoteEvent::Added { name: "Box1".into() }).unwrap();
        tx.send(RemoteEvent::Removed { name: "Box1".into() }).unwrap();

        assert!(matches!(
            channel.recv().await.unwrap(),
            RemoteEvent::Added { .. }
        ));
        assert!(matches!(
            channel.recv().await.unwrap(),
            RemoteEvent::Removed { .. }
        ));
    }

    #[tokio::test]
    async fn test_recv_fails_after_sender_drop() {
        let (tx, channel) = InMemoryChannel::pair();
        drop(tx);
        assert!(matches!(channel.recv().await, Err(ChannelError::Closed)));
    }

    #[test]
    fn test_event_name_extraction() {
        let transform = TransformRecord::new(
            "Head",
            Transform {
                position: Vec3::new(0.0, 1.7, 0.0),
                ..Transform::default()
            },
        );
        assert_eq!(RemoteEvent::Transformed(transform).name(), "Head");
        assert_eq!(RemoteEvent::Updated { name: "Box1".into() }.name(), "Box1");
    }
}
