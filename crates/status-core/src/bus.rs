use std::{
    collections::HashMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, PoisonError, RwLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::broadcast;
use tracing::warn;

use crate::types::ConnectionStatus;

/// Broadcast stream of status snapshots for async consumers.
pub type StatusStream = broadcast::Receiver<ConnectionStatus>;

type Observer = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;
type ObserverMap = Mutex<HashMap<u64, Observer>>;

/// Observer set that receives a snapshot on every status change.
///
/// Cloning the bus shares the same observer set.
#[derive(Clone)]
pub struct NotificationBus {
    observers: Arc<ObserverMap>,
    next_id: Arc<AtomicU64>,
    latest: Arc<RwLock<ConnectionStatus>>,
    event_tx: broadcast::Sender<ConnectionStatus>,
}

impl NotificationBus {
    pub fn new(stream_buffer: usize) -> Self {
        let (event_tx, _) = broadcast::channel(stream_buffer.max(1));
        Self {
            observers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
            latest: Arc::new(RwLock::new(ConnectionStatus::default())),
            event_tx,
        }
    }

    /// Register `observer`; every call registers a new entry, even for the same closure.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(observer));
        Subscription {
            id,
            observers: Arc::downgrade(&self.observers),
        }
    }

    /// Subscribe to snapshots as a broadcast stream.
    pub fn stream(&self) -> StatusStream {
        self.event_tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Most recently published (or seeded) snapshot.
    pub fn latest(&self) -> ConnectionStatus {
        *self.latest.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the latest snapshot without notifying anyone.
    pub fn seed(&self, status: ConnectionStatus) {
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Deliver `status` to every current observer.
    ///
    /// A panicking observer is logged and skipped. Observers removed while
    /// delivery is in flight may still receive this snapshot.
    pub fn publish(&self, status: ConnectionStatus) {
        self.seed(status);

        let targets: Vec<(u64, Observer)> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, observer)| (*id, Arc::clone(observer)))
            .collect();

        for (id, observer) in targets {
            if panic::catch_unwind(AssertUnwindSafe(|| observer(status))).is_err() {
                warn!(observer = id, "status observer panicked; continuing delivery");
            }
        }

        // Lagged or absent stream receivers are not an error.
        let _ = self.event_tx.send(status);
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBus")
            .field("observers", &self.observer_count())
            .field("latest", &self.latest())
            .finish()
    }
}

/// Handle returned by [`NotificationBus::subscribe`].
///
/// Dropping the handle keeps the observer registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    observers: Weak<ObserverMap>,
}

impl Subscription {
    /// Remove the observer. Returns `false` if it was already removed.
    pub fn unsubscribe(&self) -> bool {
        let Some(observers) = self.observers.upgrade() else {
            return false;
        };
        observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id)
            .is_some()
    }
}
