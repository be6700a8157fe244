//! Environment-backed runtime configuration for `status-smoke`.

use std::{env, error::Error, fmt, time::Duration};

use status_core::RetryPolicy;
use status_sse::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_TIMEOUT, MonitorConfig};

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Runtime configuration used by the smoke binary.
#[derive(Debug, Clone, PartialEq)]
pub struct SmokeConfig {
    pub monitor: MonitorConfig,
}

impl SmokeConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let base_url = optional_trimmed_env("STATUS_MONITOR_BASE_URL", &mut lookup)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());

        let defaults = RetryPolicy::default();
        let base_delay_ms = parse_optional_u64(
            "STATUS_MONITOR_BACKOFF_BASE_MS",
            defaults.base_delay_ms(),
            &mut lookup,
        )?;
        let max_delay_ms = parse_optional_u64(
            "STATUS_MONITOR_BACKOFF_MAX_MS",
            defaults.max_delay_ms(),
            &mut lookup,
        )?;
        let factor = parse_optional_f64(
            "STATUS_MONITOR_BACKOFF_FACTOR",
            defaults.factor(),
            &mut lookup,
        )?;
        let connect_timeout_ms = parse_optional_u64(
            "STATUS_MONITOR_CONNECT_TIMEOUT_MS",
            DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            &mut lookup,
        )?;
        let heartbeat_timeout_ms = parse_optional_u64(
            "STATUS_MONITOR_HEARTBEAT_TIMEOUT_MS",
            DEFAULT_HEARTBEAT_TIMEOUT.as_millis() as u64,
            &mut lookup,
        )?;

        if connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "STATUS_MONITOR_CONNECT_TIMEOUT_MS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        let retry_policy = RetryPolicy::new(base_delay_ms, max_delay_ms, factor);
        if let Err(err) = retry_policy.validate() {
            let (key, value) = if base_delay_ms == 0 {
                ("STATUS_MONITOR_BACKOFF_BASE_MS", base_delay_ms.to_string())
            } else if max_delay_ms < base_delay_ms {
                ("STATUS_MONITOR_BACKOFF_MAX_MS", max_delay_ms.to_string())
            } else {
                ("STATUS_MONITOR_BACKOFF_FACTOR", factor.to_string())
            };
            return Err(ConfigError::InvalidValue {
                key,
                value,
                reason: err.message,
            });
        }

        let monitor = MonitorConfig::new(base_url)
            .with_retry_policy(retry_policy)
            .with_connect_timeout(Duration::from_millis(connect_timeout_ms))
            .with_heartbeat_timeout(
                (heartbeat_timeout_ms > 0).then(|| Duration::from_millis(heartbeat_timeout_ms)),
            );

        if let Err(err) = monitor.validate() {
            return Err(ConfigError::InvalidValue {
                key: "STATUS_MONITOR_BASE_URL",
                value: monitor.base_url,
                reason: err.message,
            });
        }

        Ok(Self { monitor })
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_optional_u64<F>(
    key: &'static str,
    default: u64,
    lookup: &mut F,
) -> Result<u64, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    value
        .parse::<u64>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

fn parse_optional_f64<F>(
    key: &'static str,
    default: f64,
    lookup: &mut F,
) -> Result<f64, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    value
        .parse::<f64>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}
