//! Core connection-status contract shared by the transport driver and observers.
//!
//! This crate defines the status model, the monitor input/directive protocol,
//! the reconnect backoff, and the pure state machine that reconciles stream
//! events and host presence into one [`ConnectionStatus`].

/// Observer registry and snapshot fan-out.
pub mod bus;
/// Stable monitor error types and HTTP classification helpers.
pub mod error;
/// Host presence bookkeeping.
pub mod presence;
/// Single mutation point for the connection status.
pub mod reconciler;
/// Backoff policy used by the reconnect timer.
pub mod retry;
/// Input dispatch for one monitor run.
pub mod state_machine;
/// Stream handle and reconnect timer bookkeeping.
pub mod stream;
/// Status model and the input/directive protocol.
pub mod types;

pub use bus::{NotificationBus, StatusStream, Subscription};
pub use error::{MonitorError, MonitorErrorCategory, classify_http_status};
pub use presence::PresenceTracker;
pub use reconciler::{StatusChange, StatusReconciler};
pub use retry::{Backoff, RetryPolicy};
pub use state_machine::MonitorStateMachine;
pub use stream::StreamSupervisor;
pub use types::{
    ConnectionStatus, Directive, Generation, MonitorInput, PresenceSignal, TransportEvent,
};
