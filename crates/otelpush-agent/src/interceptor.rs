//! Request interceptor.
//!
//! [`track_requests`] is an axum middleware (`from_fn_with_state`) that wraps
//! every request in `on_request_start` / `on_request_end`. It never touches
//! the request or response and has no error path of its own.
//!
//! [`RequestContext`] records its latency exactly once: on `finish`, or on
//! drop when the handler future is cancelled or unwinds.

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};

use crate::telemetry::Telemetry;

pub struct RequestContext {
    telemetry: Telemetry,
    endpoint: String,
    started: Instant,
    recorded: bool,
}

impl RequestContext {
    pub(crate) fn new(telemetry: Telemetry, endpoint: String, started: Instant) -> Self {
        Self {
            telemetry,
            endpoint,
            started,
            recorded: false,
        }
    }

    /// `"METHOD PATH"` key (or the overflow key) this request counts under.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn finish(mut self) {
        self.record();
    }

    fn record(&mut self) {
        if self.recorded {
            return;
        }
        self.recorded = true;
        let elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.telemetry.record_latency(&self.endpoint, elapsed_ms);
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        self.record();
    }
}

/// Route template when the router matched one (`/users/:id`), raw path
/// otherwise, so path parameters do not explode endpoint cardinality.
fn endpoint_path(req: &Request) -> String {
    match req.extensions().get::<MatchedPath>() {
        Some(p) => p.as_str().to_owned(),
        None => req.uri().path().to_owned(),
    }
}

pub async fn track_requests(
    State(telemetry): State<Telemetry>,
    req: Request,
    next: Next,
) -> Response {
    let ctx = telemetry.on_request_start(req.method().as_str(), &endpoint_path(&req));
    let resp = next.run(req).await;
    telemetry.on_request_end(ctx);
    resp
}
