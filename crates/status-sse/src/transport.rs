//! Stream handles: the transport seam and its server-sent-events implementation.

use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use futures_util::{Stream, StreamExt, future::BoxFuture};
use reqwest::{
    Url,
    header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE},
};
use status_core::{Generation, MonitorInput, TransportEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::{config::MonitorConfig, error::TransportError, sse::SseDecoder};

/// Reporting channel handed to one stream handle.
#[derive(Debug, Clone)]
pub struct TransportSink {
    generation: Generation,
    input_tx: mpsc::Sender<MonitorInput>,
}

impl TransportSink {
    pub fn new(generation: Generation, input_tx: mpsc::Sender<MonitorInput>) -> Self {
        Self {
            generation,
            input_tx,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Report one lifecycle event. Returns `false` once the monitor stopped listening.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        self.input_tx
            .send(MonitorInput::Transport {
                generation: self.generation,
                event,
            })
            .await
            .is_ok()
    }

    /// Report a failure; the handle must not emit anything afterwards.
    pub async fn fail(&self, reason: impl fmt::Display) -> bool {
        self.emit(TransportEvent::Failed {
            reason: reason.to_string(),
        })
        .await
    }
}

/// Opens stream handles on behalf of the monitor.
///
/// `run` drives one handle to completion: it must report exactly one
/// `Opened` before any liveness event, and end with `Failed` unless the sink
/// is closed. Construction errors are reported as `Failed`, never returned.
/// Dropping the returned future tears the handle down.
pub trait StreamTransport: Send + Sync + 'static {
    fn run(&self, sink: TransportSink) -> BoxFuture<'static, ()>;
}

impl<T: StreamTransport + ?Sized> StreamTransport for Arc<T> {
    fn run(&self, sink: TransportSink) -> BoxFuture<'static, ()> {
        (**self).run(sink)
    }
}

/// `text/event-stream` transport over reqwest.
#[derive(Debug, Clone)]
pub struct SseTransport {
    client: reqwest::Client,
    url: Url,
    heartbeat_timeout: Option<Duration>,
}

impl SseTransport {
    pub fn new(config: &MonitorConfig) -> Result<Self, TransportError> {
        let url = config.stream_url()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            client,
            url,
            heartbeat_timeout: config.heartbeat_timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn run_once(self, sink: TransportSink) {
        let generation = sink.generation();
        match self.stream(&sink).await {
            Ok(()) => debug!(generation, "monitor dropped stream sink"),
            Err(err) => {
                debug!(generation, error = %err, "stream attempt ended");
                sink.fail(err).await;
            }
        }
    }

    async fn stream(&self, sink: &TransportSink) -> Result<(), TransportError> {
        info!(url = %self.url, generation = sink.generation(), "connecting status stream");
        let response = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with("text/event-stream") {
            return Err(TransportError::ContentType(content_type.to_owned()));
        }

        if !sink.emit(TransportEvent::Opened).await {
            return Ok(());
        }

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        loop {
            let Some(chunk) = next_within(&mut body, self.heartbeat_timeout).await? else {
                return Err(TransportError::Closed);
            };
            let chunk: Bytes = chunk?;
            for frame in decoder.push(&chunk)? {
                trace!(event = ?frame.event, "stream frame");
                if !sink.emit(frame.transport_event()).await {
                    return Ok(());
                }
            }
        }
    }
}

impl StreamTransport for SseTransport {
    fn run(&self, sink: TransportSink) -> BoxFuture<'static, ()> {
        Box::pin(self.clone().run_once(sink))
    }
}

/// Next body item, failing when nothing arrives within `limit`.
async fn next_within<S>(
    body: &mut S,
    limit: Option<Duration>,
) -> Result<Option<S::Item>, TransportError>
where
    S: Stream + Unpin,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, body.next())
            .await
            .map_err(|_| TransportError::HeartbeatTimeout(limit)),
        None => Ok(body.next().await),
    }
}
