//! Exporter: encode a batch and push it to the collector.
//!
//! Best effort only. Every failure (encoding, transport, non-2xx) is logged
//! and folded into an [`ExportOutcome`]; `export` never returns an error and
//! never retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;

use otelpush_core::error::{OtelPushError, Result};
use otelpush_core::protocol::otlp::{self, ExportRequest};

/// Result of one export attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Collector accepted the batch; number of metric records pushed.
    Pushed(usize),
    /// Collector answered with this non-2xx status.
    Rejected(u16),
    /// Network, DNS, or timeout failure.
    TransportFailed,
    /// Batch could not be serialized (or the tick building it failed).
    EncodeFailed,
    /// No export attempted: another one was still in flight, or the
    /// scheduler has stopped.
    Skipped,
}

impl ExportOutcome {
    pub fn is_pushed(&self) -> bool {
        matches!(self, ExportOutcome::Pushed(_))
    }
}

/// Destination for encoded batches.
///
/// Implementations report a non-2xx answer as `OtelPushError::Rejected` and
/// anything that prevented an answer as `OtelPushError::Transport`.
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn send(&self, body: Bytes) -> Result<()>;
}

/// OTLP/HTTP JSON sink with bearer authentication.
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpSink {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OtelPushError::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl MetricSink for HttpSink {
    async fn send(&self, body: Bytes) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| OtelPushError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let text = match resp.text().await {
            Ok(t) => t,
            Err(e) => format!("<unreadable response body: {e}>"),
        };
        Err(OtelPushError::Rejected {
            status: status.as_u16(),
            body: text,
        })
    }
}

#[derive(Clone)]
pub struct Exporter {
    sink: Arc<dyn MetricSink>,
}

impl Exporter {
    pub fn new(sink: Arc<dyn MetricSink>) -> Self {
        Self { sink }
    }

    pub async fn export(&self, batch: &ExportRequest) -> ExportOutcome {
        let count = batch.metric_count();
        let payload = match otlp::encode(batch) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(
                    kind = e.kind().as_str(),
                    error = %e,
                    "failed to encode metrics batch"
                );
                return ExportOutcome::EncodeFailed;
            }
        };

        match self.sink.send(payload.clone()).await {
            Ok(()) => {
                tracing::info!(metrics = count, "successfully pushed metrics");
                ExportOutcome::Pushed(count)
            }
            Err(OtelPushError::Rejected { status, body }) => {
                tracing::error!(
                    kind = "REJECTED",
                    status,
                    response = %body,
                    payload = %String::from_utf8_lossy(&payload),
                    "failed to send metrics"
                );
                ExportOutcome::Rejected(status)
            }
            Err(e) => {
                tracing::error!(kind = e.kind().as_str(), error = %e, "error sending metrics");
                ExportOutcome::TransportFailed
            }
        }
    }
}
