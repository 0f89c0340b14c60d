use std::fmt;

use serde::Deserialize;
use otelpush_core::error::{OtelPushError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    pub version: u32,

    #[serde(default)]
    pub service: ServiceSection,

    pub telemetry: TelemetrySection,
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(OtelPushError::Config(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.service.validate()?;
        self.telemetry.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl ServiceSection {
    pub fn validate(&self) -> Result<()> {
        if self.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(OtelPushError::Config(
                "service.listen must be a valid socket address".into(),
            ));
        }
        Ok(())
    }
}

/// Resolution of the CPU and memory percentage gauges.
///
/// `integer` emits whole percents as `asInt`; `hundredths` emits two-decimal
/// percents as `asDouble`. Both gauges always share one policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PercentPrecision {
    Integer,
    #[default]
    Hundredths,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Value of the `source` attribute on every data point.
    #[serde(default = "default_source")]
    pub source: String,

    pub collector_url: String,

    pub api_key: String,

    #[serde(default = "default_flush_period_ms")]
    pub flush_period_ms: u64,

    #[serde(default = "default_active_user_window_ms")]
    pub active_user_window_ms: u64,

    /// Zero both latency families after every export tick.
    #[serde(default)]
    pub latency_reset_on_flush: bool,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    #[serde(default)]
    pub percent_precision: PercentPrecision,

    #[serde(default = "default_max_endpoints")]
    pub max_endpoints: usize,

    /// Presence entries older than this are swept each tick.
    /// Defaults to four active-user windows.
    #[serde(default)]
    pub presence_retention_ms: Option<u64>,
}

impl TelemetrySection {
    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(OtelPushError::Config("telemetry.source must not be empty".into()));
        }

        let url = reqwest::Url::parse(&self.collector_url).map_err(|e| {
            OtelPushError::Config(format!("telemetry.collector_url is not a valid url: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(OtelPushError::Config(
                "telemetry.collector_url must use http or https".into(),
            ));
        }

        if self.api_key.trim().is_empty() {
            return Err(OtelPushError::Config("telemetry.api_key must not be empty".into()));
        }
        if !(1_000..=3_600_000).contains(&self.flush_period_ms) {
            return Err(OtelPushError::Config(
                "telemetry.flush_period_ms must be between 1000 and 3600000".into(),
            ));
        }
        if self.active_user_window_ms == 0 {
            return Err(OtelPushError::Config(
                "telemetry.active_user_window_ms must be greater than 0".into(),
            ));
        }
        if self.request_timeout_ms == 0 || self.shutdown_timeout_ms == 0 {
            return Err(OtelPushError::Config(
                "telemetry request/shutdown timeouts must be greater than 0".into(),
            ));
        }
        if self.max_endpoints == 0 {
            return Err(OtelPushError::Config(
                "telemetry.max_endpoints must be greater than 0".into(),
            ));
        }
        if let Some(retention) = self.presence_retention_ms {
            if retention < self.active_user_window_ms {
                return Err(OtelPushError::Config(
                    "telemetry.presence_retention_ms must be >= active_user_window_ms".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn presence_retention_ms(&self) -> u64 {
        self.presence_retention_ms
            .unwrap_or_else(|| self.active_user_window_ms.saturating_mul(4))
    }
}

impl fmt::Debug for TelemetrySection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetrySection")
            .field("source", &self.source)
            .field("collector_url", &self.collector_url)
            .field("api_key", &"<redacted>")
            .field("flush_period_ms", &self.flush_period_ms)
            .field("active_user_window_ms", &self.active_user_window_ms)
            .field("latency_reset_on_flush", &self.latency_reset_on_flush)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("shutdown_timeout_ms", &self.shutdown_timeout_ms)
            .field("percent_precision", &self.percent_precision)
            .field("max_endpoints", &self.max_endpoints)
            .field("presence_retention_ms", &self.presence_retention_ms)
            .finish()
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_source() -> String {
    "otelpush-service".into()
}
fn default_flush_period_ms() -> u64 {
    60_000
}
fn default_active_user_window_ms() -> u64 {
    300_000
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_shutdown_timeout_ms() -> u64 {
    5_000
}
fn default_max_endpoints() -> usize {
    256
}
