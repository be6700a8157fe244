//! Host-facing abstractions: network presence notifications and wall clocks.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use status_core::PresenceSignal;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

/// Receiver side of one presence registration. Dropping it unregisters.
pub type PresenceListener = broadcast::Receiver<PresenceSignal>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PresenceError {
    #[error("host cannot report network presence")]
    Unsupported,
    #[error("presence backend failure: {0}")]
    Backend(String),
}

/// Source of host reachable/unreachable notifications.
pub trait PresenceSource: Send + Sync {
    /// Current presence, or `None` when the host cannot report it.
    fn current(&self) -> Option<bool>;

    /// Register for reachable and unreachable notifications.
    fn listen(&self) -> Result<PresenceListener, PresenceError>;
}

/// Presence driven programmatically, for embedders that receive OS
/// connectivity callbacks themselves, and for tests.
#[derive(Clone, Debug)]
pub struct ManualPresence {
    online: Arc<AtomicBool>,
    signal_tx: broadcast::Sender<PresenceSignal>,
}

impl ManualPresence {
    pub fn new(online: bool) -> Self {
        let (signal_tx, _) = broadcast::channel(16);
        Self {
            online: Arc::new(AtomicBool::new(online)),
            signal_tx,
        }
    }

    /// Record a presence change and notify every listener.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        let signal = if online {
            PresenceSignal::Reachable
        } else {
            PresenceSignal::Unreachable
        };
        let delivered = self.signal_tx.send(signal).unwrap_or(0);
        debug!(?signal, listeners = delivered, "presence signal emitted");
    }

    /// Number of live registrations.
    pub fn listener_count(&self) -> usize {
        self.signal_tx.receiver_count()
    }
}

impl Default for ManualPresence {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PresenceSource for ManualPresence {
    fn current(&self) -> Option<bool> {
        Some(self.online.load(Ordering::SeqCst))
    }

    fn listen(&self) -> Result<PresenceListener, PresenceError> {
        Ok(self.signal_tx.subscribe())
    }
}

/// Host without any presence API.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPresence;

impl PresenceSource for UnsupportedPresence {
    fn current(&self) -> Option<bool> {
        None
    }

    fn listen(&self) -> Result<PresenceListener, PresenceError> {
        Err(PresenceError::Unsupported)
    }
}

impl<P: PresenceSource + ?Sized> PresenceSource for Arc<P> {
    fn current(&self) -> Option<bool> {
        (**self).current()
    }

    fn listen(&self) -> Result<PresenceListener, PresenceError> {
        (**self).listen()
    }
}
