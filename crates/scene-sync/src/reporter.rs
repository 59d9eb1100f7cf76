//! Per-object change reporters.
//!
//! Every local replica owns a [`ChangeReporter`]. Application code reports
//! local edits through it; the engine subscribes after registration so that
//! further edits are pushed to the remote store automatically. Subscriptions
//! follow the disposer pattern: hold the [`ReporterSubscription`] to keep
//! receiving changes, drop it to unsubscribe — removal/replace detaches
//! deterministically by dropping the engine's stored handles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// A local edit on a replicated object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalChange {
    /// The property set changed; the new set should be pushed outward.
    Properties,
    /// The spatial frame changed; the new transform should be pushed outward.
    Transform,
}

struct ReporterInner {
    callbacks: RwLock<Vec<(usize, Arc<dyn Fn(LocalChange) + Send + Sync>)>>,
    next_id: AtomicUsize,
}

/// Subscription handle that unsubscribes automatically when dropped.
pub struct ReporterSubscription {
    inner: Weak<ReporterInner>,
    id: usize,
}

impl Drop for ReporterSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            // Use try_write to avoid deadlock if Drop runs during panic
            // unwinding while a read lock is held (e.g. during report).
            if let Ok(mut guard) = inner.callbacks.try_write() {
                guard.retain(|(i, _)| *i != self.id);
            }
        }
    }
}

/// Change observer attached to a single local replica.
#[derive(Clone)]
pub struct ChangeReporter {
    inner: Arc<ReporterInner>,
}

impl Default for ChangeReporter {
    fn default() -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                callbacks: RwLock::new(Vec::new()),
                next_id: AtomicUsize::new(0),
            }),
        }
    }
}

impl ChangeReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to changes. Returns a handle that unsubscribes on drop.
    pub fn subscribe(
        &self,
        callback: impl Fn(LocalChange) + Send + Sync + 'static,
    ) -> ReporterSubscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        ReporterSubscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Report a local edit to all subscribers.
    pub fn report(&self, change: LocalChange) {
        // Clone the callback list so a callback may subscribe without deadlock.
        let callbacks: Vec<_> = self
            .inner
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(change);
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.inner
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_and_report() {
        let reporter = ChangeReporter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let _sub = reporter.subscribe(move |change| {
            assert_eq!(change, LocalChange::Properties);
            count_clone.fetch_add(1, Ordering::Relaxed);
        });

        reporter.report(LocalChange::Properties);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let reporter = ChangeReporter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        {
            let _sub = reporter.subscribe(move |_| {
                count_clone.fetch_add(1, Ordering::Relaxed);
            });
            reporter.report(LocalChange::Transform);
        }

        reporter.report(LocalChange::Transform);
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(reporter.subscriber_count(), 0);
    }

    #[test]
    fn test_multiple_subscribers_each_notified() {
        let reporter = ChangeReporter::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&count);
        let c2 = Arc::clone(&count);
        let _sub1 = reporter.subscribe(move |_| {
            c1.fetch_add(1, Ordering::Relaxed);
        });
        let _sub2 = reporter.subscribe(move |_| {
            c2.fetch_add(1, Ordering::Relaxed);
        });

        reporter.report(LocalChange::Properties);
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }
}
