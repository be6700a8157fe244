mod config;
mod logging;

use std::{process::ExitCode, sync::Arc};

use status_platform::ManualPresence;
use status_sse::{StatusMonitor, probe_health};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use crate::config::SmokeConfig;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let config = match SmokeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid smoke configuration");
            return ExitCode::FAILURE;
        }
    };

    match probe_health(&reqwest::Client::new(), &config.monitor).await {
        Ok(report) if report.is_ok() => info!(status = %report.status, "health probe passed"),
        Ok(report) => warn!(status = %report.status, "health endpoint reports degraded service"),
        Err(err) => warn!(error = %err, code = err.code(), "health probe failed"),
    }

    let presence = Arc::new(ManualPresence::new(true));
    let monitor = match StatusMonitor::connect(&config.monitor, Arc::clone(&presence)) {
        Ok(monitor) => monitor,
        Err(err) => {
            error!(error = %err, "failed to build status monitor");
            return ExitCode::FAILURE;
        }
    };

    let _subscription = monitor.subscribe(|status| {
        info!(
            connected = status.connected,
            online = status.online,
            last_event_ms = status.last_event_ms,
            "status changed"
        );
    });

    monitor.start().await;
    info!(
        base_url = %config.monitor.base_url,
        "monitoring; type 'online' or 'offline' to simulate presence, ctrl-c to quit"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => match line.trim() {
                    "online" => presence.set_online(true),
                    "offline" => presence.set_online(false),
                    "" => {}
                    other => warn!(input = other, "unknown command"),
                },
                Ok(None) => {
                    // stdin closed; keep monitoring until interrupted.
                    if let Err(err) = tokio::signal::ctrl_c().await {
                        warn!(error = %err, "failed to wait for ctrl-c");
                    }
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "failed to read stdin");
                    break;
                }
            },
        }
    }

    monitor.stop().await;
    let last = monitor.status();
    info!(
        connected = last.connected,
        online = last.online,
        "status monitor shut down"
    );
    ExitCode::SUCCESS
}
