use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad error category used for logging and reconnect decisions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MonitorErrorCategory {
    /// Invalid configuration or unsupported input.
    Config,
    /// Transient network or transport failure.
    Network,
    /// Endpoint answered with something that is not an event stream.
    Protocol,
    /// Internal bug or invariant break.
    Internal,
}

/// Stable error payload shared by every monitor crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct MonitorError {
    /// High-level error category.
    pub category: MonitorErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl MonitorError {
    /// Construct a new monitor error.
    pub fn new(
        category: MonitorErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether reconnecting later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.category,
            MonitorErrorCategory::Network | MonitorErrorCategory::Protocol
        )
    }
}

/// Map stream endpoint HTTP status codes to error categories.
pub fn classify_http_status(status: u16) -> MonitorErrorCategory {
    match status {
        408 | 429 => MonitorErrorCategory::Network,
        400..=499 => MonitorErrorCategory::Config,
        500..=599 => MonitorErrorCategory::Network,
        200..=299 => MonitorErrorCategory::Protocol,
        _ => MonitorErrorCategory::Internal,
    }
}
