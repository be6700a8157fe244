use std::time::Duration;

use status_core::{MonitorError, MonitorErrorCategory, classify_http_status};
use thiserror::Error;

/// Failures of one stream or probe attempt.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned HTTP {status}")]
    Status { status: u16 },

    #[error("unexpected content type '{0}'")]
    ContentType(String),

    #[error("stream closed by server")]
    Closed,

    #[error("stream frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("no data received for {}ms", .0.as_millis())]
    HeartbeatTimeout(Duration),

    #[error("malformed health response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Config(MonitorError),
}

impl TransportError {
    pub fn category(&self) -> MonitorErrorCategory {
        match self {
            Self::Http(err) => match err.status() {
                Some(status) => classify_http_status(status.as_u16()),
                None if err.is_builder() => MonitorErrorCategory::Config,
                None => MonitorErrorCategory::Network,
            },
            Self::Status { status } => classify_http_status(*status),
            Self::ContentType(_) | Self::FrameTooLarge { .. } | Self::Decode(_) => {
                MonitorErrorCategory::Protocol
            }
            Self::Closed | Self::HeartbeatTimeout(_) => MonitorErrorCategory::Network,
            Self::Config(err) => err.category,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "stream_request_failed",
            Self::Status { .. } => "stream_http_status",
            Self::ContentType(_) => "stream_content_type",
            Self::Closed => "stream_closed",
            Self::FrameTooLarge { .. } => "stream_frame_too_large",
            Self::HeartbeatTimeout(_) => "heartbeat_timeout",
            Self::Decode(_) => "health_decode",
            Self::Config(_) => "invalid_config",
        }
    }
}

impl From<MonitorError> for TransportError {
    fn from(err: MonitorError) -> Self {
        Self::Config(err)
    }
}

impl From<TransportError> for MonitorError {
    fn from(err: TransportError) -> Self {
        if let TransportError::Config(inner) = err {
            return inner;
        }
        MonitorError::new(err.category(), err.code(), err.to_string())
    }
}
