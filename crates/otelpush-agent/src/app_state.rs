//! Shared application state for the agent binary.
//!
//! Builds the telemetry aggregator and the exporter from config, and carries
//! the draining flag reported by `/readyz` during shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use otelpush_core::error::Result;

use crate::config::AgentConfig;
use crate::pipeline::{Exporter, HttpSink, Scheduler};
use crate::telemetry::Telemetry;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    telemetry: Telemetry,
}

struct AppStateInner {
    cfg: AgentConfig,
    exporter: Exporter,
    draining: AtomicBool,
}

impl AppState {
    /// Build application state.
    /// Returns Result so main can handle errors gracefully (no panic).
    pub fn new(cfg: AgentConfig) -> Result<Self> {
        let t = &cfg.telemetry;
        let sink = HttpSink::new(
            t.collector_url.clone(),
            t.api_key.clone(),
            Duration::from_millis(t.request_timeout_ms),
        )?;
        let telemetry = Telemetry::new(t);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                exporter: Exporter::new(Arc::new(sink)),
                cfg,
                draining: AtomicBool::new(false),
            }),
            telemetry,
        })
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry.clone()
    }

    /// Scheduler wired to this state's telemetry and exporter (not started).
    pub fn scheduler(&self) -> Scheduler {
        let t = &self.inner.cfg.telemetry;
        Scheduler::new(
            self.telemetry.clone(),
            self.inner.exporter.clone(),
            Duration::from_millis(t.flush_period_ms),
            Duration::from_millis(t.shutdown_timeout_ms),
        )
    }

    /// Mark draining state.
    pub fn set_draining(&self) {
        self.inner.draining.store(true, Ordering::Relaxed);
    }

    /// Return whether draining is active.
    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Relaxed)
    }
}
