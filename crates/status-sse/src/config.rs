use std::{fmt, time::Duration};

use reqwest::Url;
use status_core::{MonitorError, MonitorErrorCategory, RetryPolicy};

pub const DEFAULT_STREAM_PATH: &str = "/api/v1/health/stream";
pub const DEFAULT_HEALTH_PATH: &str = "/api/v1/health";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Three missed 5s server pings.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_STREAM_BUFFER: usize = 64;

/// Connection settings for one monitored endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Server base URL, for example `https://status.example.org`.
    pub base_url: String,
    /// Path of the event stream, joined onto `base_url`.
    pub stream_path: String,
    /// Path of the one-shot JSON health probe.
    pub health_path: String,
    /// Reconnect backoff.
    pub retry_policy: RetryPolicy,
    /// TCP/TLS connect timeout for each stream attempt.
    pub connect_timeout: Duration,
    /// Treat the stream as failed when silent for this long. `None` disables.
    pub heartbeat_timeout: Option<Duration>,
    /// Capacity of the snapshot broadcast stream.
    pub stream_buffer: usize,
}

impl MonitorConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            stream_path: DEFAULT_STREAM_PATH.to_owned(),
            health_path: DEFAULT_HEALTH_PATH.to_owned(),
            retry_policy: RetryPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat_timeout: Some(DEFAULT_HEARTBEAT_TIMEOUT),
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_heartbeat_timeout(mut self, heartbeat_timeout: Option<Duration>) -> Self {
        self.heartbeat_timeout = heartbeat_timeout;
        self
    }

    pub fn with_stream_path(mut self, stream_path: impl Into<String>) -> Self {
        self.stream_path = stream_path.into();
        self
    }

    pub fn stream_url(&self) -> Result<Url, MonitorError> {
        self.join(&self.stream_path)
    }

    pub fn health_url(&self) -> Result<Url, MonitorError> {
        self.join(&self.health_path)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        self.retry_policy.validate()?;
        self.stream_url()?;
        self.health_url()?;
        if self.connect_timeout.is_zero() {
            return Err(MonitorError::new(
                MonitorErrorCategory::Config,
                "invalid_connect_timeout",
                "connect timeout must be greater than zero",
            ));
        }
        if self.heartbeat_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(MonitorError::new(
                MonitorErrorCategory::Config,
                "invalid_heartbeat_timeout",
                "heartbeat timeout must be greater than zero when set",
            ));
        }
        Ok(())
    }

    fn join(&self, path: &str) -> Result<Url, MonitorError> {
        let base = Url::parse(&self.base_url).map_err(|err| invalid_url(&self.base_url, err))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(MonitorError::new(
                MonitorErrorCategory::Config,
                "invalid_url",
                format!("'{}' must use http or https", self.base_url),
            ));
        }
        base.join(path).map_err(|err| invalid_url(path, err))
    }
}

fn invalid_url(value: &str, err: impl fmt::Display) -> MonitorError {
    MonitorError::new(
        MonitorErrorCategory::Config,
        "invalid_url",
        format!("cannot build url from '{value}': {err}"),
    )
}
