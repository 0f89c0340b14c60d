//! otelpush agent
//!
//! - Loads `otelpush.yaml` (or `$OTELPUSH_CONFIG`)
//! - Serves `/healthz` and `/readyz` behind the request interceptor
//! - Pushes metrics to the collector every `flush_period_ms`
//! - Ctrl-C: readyz goes 503, the server drains, one final flush

use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};

use otelpush_agent::{app_state, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(kind = e.kind().as_str(), error = %e, "otelpush-agent failed");
        std::process::exit(1);
    }
}

async fn run() -> otelpush_core::Result<()> {
    let path = std::env::var("OTELPUSH_CONFIG").unwrap_or_else(|_| "otelpush.yaml".to_string());
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg
        .service
        .listen
        .parse()
        .map_err(|e| otelpush_core::OtelPushError::Config(format!("service.listen: {e}")))?;

    let state = app_state::AppState::new(cfg)?;
    let scheduler = state.scheduler().spawn();
    let app = router::build_router(state.clone());

    tracing::info!(%listen, "otelpush-agent starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| otelpush_core::OtelPushError::Internal(format!("bind failed: {e}")))?;

    let draining = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested; draining");
            draining.set_draining();
        })
        .await
        .map_err(|e| otelpush_core::OtelPushError::Internal(format!("server failed: {e}")))?;

    let outcome = scheduler.shutdown().await;
    tracing::info!(?outcome, "final metrics flush done");
    Ok(())
}
