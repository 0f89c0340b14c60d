//! Shared error type across otelpush crates.

use thiserror::Error;

/// Stable error classification, used as a structured log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or missing configuration.
    Config,
    /// OS facility unavailable while sampling host metrics.
    Sampling,
    /// Batch could not be encoded or decoded.
    Serialization,
    /// Network, DNS, or timeout failure reaching the collector.
    Transport,
    /// Collector answered with a non-2xx status.
    Rejected,
    /// Recording against a metric that was never declared.
    UndeclaredMetric,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// String representation used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Config => "CONFIG",
            ErrorKind::Sampling => "SAMPLING",
            ErrorKind::Serialization => "SERIALIZATION",
            ErrorKind::Transport => "TRANSPORT",
            ErrorKind::Rejected => "REJECTED",
            ErrorKind::UndeclaredMetric => "UNDECLARED_METRIC",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, OtelPushError>;

/// Unified error type used by core and agent.
#[derive(Debug, Error)]
pub enum OtelPushError {
    #[error("config: {0}")]
    Config(String),
    #[error("sampling: {0}")]
    Sampling(String),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("collector rejected batch (status {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("undeclared metric: {0}")]
    UndeclaredMetric(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl OtelPushError {
    /// Map an error to its stable classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OtelPushError::Config(_) => ErrorKind::Config,
            OtelPushError::Sampling(_) => ErrorKind::Sampling,
            OtelPushError::Serialization(_) => ErrorKind::Serialization,
            OtelPushError::Transport(_) => ErrorKind::Transport,
            OtelPushError::Rejected { .. } => ErrorKind::Rejected,
            OtelPushError::UndeclaredMetric(_) => ErrorKind::UndeclaredMetric,
            OtelPushError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for OtelPushError {
    fn from(e: serde_json::Error) -> Self {
        OtelPushError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        let err = OtelPushError::Rejected {
            status: 503,
            body: "busy".into(),
        };
        assert_eq!(err.kind().as_str(), "REJECTED");
        assert_eq!(err.to_string(), "collector rejected batch (status 503): busy");
        assert_eq!(OtelPushError::Config("x".into()).kind(), ErrorKind::Config);
    }
}
