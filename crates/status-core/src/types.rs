use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Point-in-time view of the monitor, handed to observers by value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// `true` when the current stream is open and has recently signaled liveness.
    pub connected: bool,
    /// `true` when the host reports network presence.
    pub online: bool,
    /// Milliseconds since Unix epoch of the most recent liveness signal.
    pub last_event_ms: u64,
}

impl ConnectionStatus {
    /// Status before any transport event has been seen.
    pub fn initial(online: bool) -> Self {
        Self {
            connected: false,
            online,
            last_event_ms: 0,
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::initial(true)
    }
}

/// Host network presence notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PresenceSignal {
    /// Host became reachable.
    Reachable,
    /// Host became unreachable.
    Unreachable,
}

impl PresenceSignal {
    pub fn is_online(self) -> bool {
        matches!(self, Self::Reachable)
    }
}

/// Lifecycle event reported by one stream handle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportEvent {
    /// Stream opened successfully.
    Opened,
    /// Dedicated heartbeat event (`event: ping`).
    Heartbeat,
    /// Any other dispatched stream event.
    Message,
    /// Construction or runtime failure; the handle is dead.
    Failed {
        /// Human-readable failure reason for logs.
        reason: String,
    },
}

/// Identifier of one stream handle or one reconnect timer.
pub type Generation = u64;

/// Input consumed by the dispatch state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorInput {
    /// Event from the stream handle identified by `generation`.
    Transport {
        generation: Generation,
        event: TransportEvent,
    },
    /// Host presence change.
    Presence(PresenceSignal),
    /// Reconnect timer `timer` elapsed.
    ReconnectDue { timer: Generation },
}

/// Side effect the async driver must carry out on behalf of the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Open a new stream handle tagged with `generation`.
    OpenStream { generation: Generation },
    /// Tear down the stream handle tagged with `generation`.
    CloseStream { generation: Generation },
    /// Arm reconnect timer `timer` to fire after `delay`.
    ScheduleReconnect { timer: Generation, delay: Duration },
    /// Disarm reconnect timer `timer`.
    CancelReconnect { timer: Generation },
}
