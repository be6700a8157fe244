//! One-shot JSON health probe.

use reqwest::header::CACHE_CONTROL;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{config::MonitorConfig, error::TransportError};

/// Body of `GET /api/v1/health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthReport {
    pub status: String,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Query the health endpoint once.
pub async fn probe_health(
    client: &reqwest::Client,
    config: &MonitorConfig,
) -> Result<HealthReport, TransportError> {
    let url = config.health_url()?;
    let response = client
        .get(url.clone())
        .header(CACHE_CONTROL, "no-store")
        .timeout(config.connect_timeout)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await?;
    let report: HealthReport = serde_json::from_slice(&body)?;
    debug!(%url, status = %report.status, "health probe answered");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;

    #[tokio::test]
    async fn reads_ok_report() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/health"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"{"status":"ok"}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let report = probe_health(&reqwest::Client::new(), &MonitorConfig::new(server.uri()))
            .await
            .expect("probe should succeed");

        assert!(report.is_ok());
    }

    #[tokio::test]
    async fn reports_error_status() {
        let server = MockServer::start().await;
        Mock::given(path("/api/v1/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = probe_health(&reqwest::Client::new(), &MonitorConfig::new(server.uri()))
            .await
            .expect_err("probe should fail");

        assert!(matches!(err, TransportError::Status { status: 500 }));
    }

    #[tokio::test]
    async fn rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(path("/api/v1/health"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("ok", "text/plain"))
            .mount(&server)
            .await;

        let err = probe_health(&reqwest::Client::new(), &MonitorConfig::new(server.uri()))
            .await
            .expect_err("probe should fail");

        assert_eq!(err.code(), "health_decode");
    }
}
