//! Server-sent-events transport, health probe and the tokio driver that
//! runs [`status_core::MonitorStateMachine`].

pub mod config;
pub mod error;
pub mod monitor;
pub mod probe;
pub mod sse;
pub mod transport;

pub use config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEALTH_PATH, DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_STREAM_PATH,
    MonitorConfig,
};
pub use error::TransportError;
pub use monitor::StatusMonitor;
pub use probe::{HealthReport, probe_health};
pub use sse::{HEARTBEAT_EVENT, MAX_FRAME_BYTES, SseDecoder, SseFrame};
pub use transport::{SseTransport, StreamTransport, TransportSink};
