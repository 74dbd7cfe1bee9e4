//! Read-only snapshots and the observer registry that publishes them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::domain::{ContentNodeValue, NodeDto};

/// Derived state exposed to observers after every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Node count, root included
    pub size: usize,
    /// Full tree dump as of the last completed mutation
    pub data: NodeDto<ContentNodeValue>,
    /// Last captured failure, empty if none
    pub error: String,
    pub is_saving: bool,
    /// Bumped on every structural change and explicit save
    pub version: u64,
    /// Bumped on every publication; never observed going backwards
    pub revision: u64,
}

impl Snapshot {
    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }
}

type Callback = Box<dyn Fn(&Snapshot) + Send + Sync>;

struct Observer {
    callback: Callback,
    /// Highest revision handed to `callback`
    delivered: AtomicU64,
}

impl Observer {
    fn deliver(&self, snapshot: &Snapshot) {
        if self.delivered.fetch_max(snapshot.revision, Ordering::SeqCst) < snapshot.revision {
            (self.callback)(snapshot);
        }
    }
}

/// Registered callbacks plus a watch channel carrying the latest snapshot.
pub(crate) struct Observers {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Arc<Observer>)>>,
    latest: watch::Sender<Snapshot>,
}

impl Observers {
    pub(crate) fn new(initial: Snapshot) -> Self {
        let (latest, _) = watch::channel(initial);
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
            latest,
        }
    }

    /// Register `callback` and hand it `current` right away.
    pub(crate) fn add(
        this: &Arc<Self>,
        callback: Callback,
        current: impl FnOnce() -> Snapshot,
    ) -> Subscription {
        let id = this.next_id.fetch_add(1, Ordering::Relaxed);
        let observer = Arc::new(Observer {
            callback,
            delivered: AtomicU64::new(0),
        });
        this.entries.lock().push((id, Arc::clone(&observer)));
        // Registered first so no publication between here and delivery is lost.
        observer.deliver(&current());
        Subscription {
            id,
            observers: Arc::downgrade(this),
        }
    }

    fn remove(&self, id: u64) {
        self.entries.lock().retain(|(entry_id, _)| *entry_id != id);
    }

    /// Deliver to every observer. Must be called without the store state lock held.
    pub(crate) fn publish(&self, snapshot: Snapshot) {
        let entries: Vec<Arc<Observer>> = self
            .entries
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in &entries {
            observer.deliver(&snapshot);
        }
        self.latest.send_if_modified(|current| {
            if snapshot.revision > current.revision {
                *current = snapshot;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn watch(&self) -> watch::Receiver<Snapshot> {
        self.latest.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Handle returned by `subscribe`; dropping it keeps the observer registered.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    observers: Weak<Observers>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {
        if let Some(observers) = self.observers.upgrade() {
            observers.remove(self.id);
        }
    }
}
