//! Observable holder for the latest job snapshot of one slot.
//!
//! [`JobStateStore`] keeps exactly one [`Job`] (or nothing) in a
//! [`tokio::sync::watch`] channel. Display code either reads the derived
//! flags directly or subscribes and reacts to changes. No history is
//! kept and snapshots are never merged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use neural_core::job::Job;
use tokio::sync::watch;

/// Shared, cheaply clonable job state for one tracking slot.
#[derive(Clone)]
pub struct JobStateStore {
    inner: Arc<Inner>,
}

struct Inner {
    tx: watch::Sender<Option<Job>>,
    version: AtomicU64,
}

impl JobStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                tx,
                version: AtomicU64::new(0),
            }),
        }
    }

    /// Replace the current snapshot wholesale.
    pub fn set(&self, job: Job) {
        self.inner.tx.send_replace(Some(job));
        self.inner.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop the current snapshot.
    pub fn clear(&self) {
        self.inner.tx.send_replace(None);
        self.inner.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Clone of the current snapshot, if any.
    pub fn snapshot(&self) -> Option<Job> {
        self.inner.tx.borrow().clone()
    }

    /// A job is held and has not reached a terminal status.
    pub fn is_active(&self) -> bool {
        self.inner
            .tx
            .borrow()
            .as_ref()
            .is_some_and(|job| !job.is_terminal())
    }

    /// A job is held and has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.inner
            .tx
            .borrow()
            .as_ref()
            .is_some_and(Job::is_terminal)
    }

    /// Failure reason of the held job; only set for failed jobs.
    pub fn error(&self) -> Option<String> {
        self.inner
            .tx
            .borrow()
            .as_ref()
            .and_then(|job| job.error.clone())
    }

    /// Number of mutations (`set` or `clear`) since creation.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::SeqCst)
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Job>> {
        self.inner.tx.subscribe()
    }
}

impl Default for JobStateStore {
    fn default() -> Self {
        Self::new()
    }
}
