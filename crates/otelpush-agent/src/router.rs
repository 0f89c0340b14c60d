//! Axum router wiring.
//!
//! Every route, including the ops endpoints, goes through the request
//! interceptor. Collaborators mounting their own routes use
//! [`instrument`] to get the same treatment.

use axum::{middleware, routing::get, Router};

use crate::{app_state::AppState, interceptor, ops, telemetry::Telemetry};

pub fn build_router(state: AppState) -> Router {
    let telemetry = state.telemetry();
    let app = Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .with_state(state);
    instrument(app, telemetry)
}

/// Wrap `router` with the request interceptor.
pub fn instrument<S>(router: Router<S>, telemetry: Telemetry) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(telemetry, interceptor::track_requests))
}
