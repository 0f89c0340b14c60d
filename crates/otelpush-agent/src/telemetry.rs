//! Telemetry aggregator: the one object collaborators call into.
//!
//! Constructed once at startup and shared by cheap `Clone` (an `Arc` inside),
//! it owns the registry, the presence tracker, the host sampler, and the frame
//! builder. Every hook is infallible from the caller's point of view: internal
//! errors are logged here and never reach the request being instrumented.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use dashmap::DashSet;

use otelpush_core::protocol::otlp::{self, ExportRequest};

use crate::config::TelemetrySection;
use crate::interceptor::RequestContext;
use crate::obs::names;
use crate::obs::{HostSampler, MetricRegistry, MonotonicClock, PresenceTracker, ResetPolicy};
use crate::pipeline::{FrameBuilder, FrameInputs};

/// Distinct `"METHOD PATH"` keys admitted so far.
///
/// Soft bound: racing first-seen inserts may overshoot `cap` by the number of
/// concurrent callers.
struct EndpointCatalog {
    seen: DashSet<String>,
    cap: usize,
    overflowed: AtomicBool,
}

impl EndpointCatalog {
    fn new(cap: usize) -> Self {
        Self {
            seen: DashSet::new(),
            cap,
            overflowed: AtomicBool::new(false),
        }
    }

    fn admit(&self, key: String) -> String {
        if self.seen.contains(&key) {
            return key;
        }
        if self.seen.len() >= self.cap {
            if !self.overflowed.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    cap = self.cap,
                    endpoint = %key,
                    "endpoint cardinality cap reached; folding new endpoints into OTHER"
                );
            }
            return names::OVERFLOW_ENDPOINT.to_string();
        }
        self.seen.insert(key.clone());
        key
    }
}

struct Settings {
    active_window_ms: u64,
    presence_retention_ms: u64,
}

struct TelemetryInner {
    registry: MetricRegistry,
    presence: PresenceTracker,
    clock: MonotonicClock,
    endpoints: EndpointCatalog,
    sampler: HostSampler,
    frames: FrameBuilder,
    settings: Settings,
}

#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<TelemetryInner>,
}

impl Telemetry {
    /// Build with the `sysinfo`-backed host sampler.
    pub fn new(cfg: &TelemetrySection) -> Self {
        Self::with_sampler(cfg, HostSampler::system(cfg.percent_precision))
    }

    pub fn with_sampler(cfg: &TelemetrySection, sampler: HostSampler) -> Self {
        let latency_policy = if cfg.latency_reset_on_flush {
            ResetPolicy::ResetOnFlush
        } else {
            ResetPolicy::Cumulative
        };

        let mut builder = MetricRegistry::builder();
        for (name, unit) in names::DECLARED_COUNTERS {
            builder = builder.counter(name, unit);
        }
        let registry = builder
            .latency(names::REQUEST_LATENCY, latency_policy)
            .latency(names::ENDPOINT_LATENCY, latency_policy)
            .build();

        Self {
            inner: Arc::new(TelemetryInner {
                registry,
                presence: PresenceTracker::new(),
                clock: MonotonicClock::new(),
                endpoints: EndpointCatalog::new(cfg.max_endpoints),
                sampler,
                frames: FrameBuilder::new(cfg.source.clone()),
                settings: Settings {
                    active_window_ms: cfg.active_user_window_ms,
                    presence_retention_ms: cfg.presence_retention_ms(),
                },
            }),
        }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.inner.registry
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.inner.presence
    }

    pub fn now_ms(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    // ---- request boundary

    /// Count the request and start its latency measurement.
    pub fn on_request_start(&self, method: &str, path: &str) -> RequestContext {
        let reg = &self.inner.registry;
        reg.increment_counter(names::HTTP_REQUESTS_TOTAL, names::UNIT_COUNT, 1, &[]);
        if let Some(counter) = names::method_counter(method) {
            reg.increment_counter(counter, names::UNIT_COUNT, 1, &[]);
        }

        let endpoint = self.inner.endpoints.admit(names::endpoint_key(method, path));
        reg.increment_counter(
            names::HTTP_REQUESTS_ENDPOINT,
            names::UNIT_COUNT,
            1,
            &[(names::ATTR_ENDPOINT, endpoint.as_str())],
        );

        RequestContext::new(self.clone(), endpoint, Instant::now())
    }

    /// Finish the request's latency measurement. Same as dropping `ctx`.
    pub fn on_request_end(&self, ctx: RequestContext) {
        ctx.finish();
    }

    pub(crate) fn record_latency(&self, endpoint: &str, elapsed_ms: u64) {
        let reg = &self.inner.registry;
        let results = [
            reg.add_latency_sample(names::ENDPOINT_LATENCY, Some(endpoint), elapsed_ms),
            reg.add_latency_sample(names::REQUEST_LATENCY, None, elapsed_ms),
        ];
        for r in results {
            if let Err(e) = r {
                tracing::warn!(
                    kind = e.kind().as_str(),
                    error = %e,
                    endpoint,
                    "latency sample dropped"
                );
            }
        }
    }

    // ---- domain events

    pub fn on_auth_success(&self) {
        self.inner
            .registry
            .increment_counter(names::AUTH_SUCCESS, names::UNIT_COUNT, 1, &[]);
    }

    pub fn on_auth_failure(&self) {
        self.inner
            .registry
            .increment_counter(names::AUTH_FAILURE, names::UNIT_COUNT, 1, &[]);
    }

    /// Login or registration.
    pub fn on_user_login(&self, token: &str) {
        self.inner.presence.touch(token, self.now_ms());
    }

    pub fn on_user_logout(&self, token: &str) {
        self.inner.presence.remove(token);
    }

    /// Any authenticated request.
    pub fn on_user_activity(&self, token: &str) {
        self.inner.presence.touch(token, self.now_ms());
    }

    /// Revenue is rounded to cents once, here, then accumulated as an integer.
    pub fn on_order_completed(&self, item_count: u64, revenue_usd: f64) {
        let reg = &self.inner.registry;
        reg.increment_counter(names::ORDERS_COMPLETED, names::UNIT_COUNT, 1, &[]);
        reg.increment_counter(names::ITEMS_SOLD, names::UNIT_COUNT, item_count, &[]);

        match usd_to_cents(revenue_usd) {
            Some(cents) => {
                reg.increment_counter(names::REVENUE_CENTS, names::UNIT_CENTS, cents, &[])
            }
            None => tracing::warn!(
                revenue_usd,
                "order revenue is not a non-negative amount; not recorded"
            ),
        }
    }

    pub fn on_order_failed(&self) {
        self.inner
            .registry
            .increment_counter(names::ORDERS_FAILED, names::UNIT_COUNT, 1, &[]);
    }

    /// Service-defined gauge, exported as `asDouble` on every tick until
    /// overwritten. Host readings and active users do not go through here.
    pub fn set_gauge(&self, name: &str, unit: &str, value: f64) {
        self.inner.registry.set_gauge(name, unit, value);
    }

    // ---- export side

    /// Distinct tokens seen within the configured window, as of now.
    pub fn active_users(&self) -> usize {
        self.inner
            .presence
            .count_active(self.inner.settings.active_window_ms, self.now_ms())
    }

    /// One tick's worth of collection: sample the host, snapshot the registry
    /// (resetting interval-scoped accumulators in the same critical section),
    /// count active users, sweep stale presence, and build the batch.
    pub fn collect_frame(&self) -> ExportRequest {
        let inner = &self.inner;
        let host = inner.sampler.sample();

        let snap = if inner.registry.has_interval_reset() {
            inner.registry.snapshot_and_reset()
        } else {
            inner.registry.snapshot()
        };

        let now = self.now_ms();
        let active = inner.presence.count_active(inner.settings.active_window_ms, now);
        let swept = inner
            .presence
            .sweep(now.saturating_sub(inner.settings.presence_retention_ms));
        if swept > 0 {
            tracing::debug!(swept, "presence entries past retention removed");
        }

        inner.frames.build(
            &snap,
            FrameInputs {
                host,
                precision: inner.sampler.precision(),
                active_users: active as u64,
                time_unix_nano: otlp::unix_nanos(SystemTime::now()),
            },
        )
    }
}

fn usd_to_cents(usd: f64) -> Option<u64> {
    if !usd.is_finite() || usd < 0.0 {
        return None;
    }
    let cents = (usd * 100.0).round();
    if cents > u64::MAX as f64 {
        return None;
    }
    Some(cents as u64)
}
