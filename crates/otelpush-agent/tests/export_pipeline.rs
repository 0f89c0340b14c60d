//! End-to-end export tests against an in-process collector.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};

use otelpush_agent::app_state::AppState;
use otelpush_agent::config;
use otelpush_agent::pipeline::ExportOutcome;
use otelpush_agent::router;
use otelpush_core::protocol::otlp::{self, ExportRequest, MetricData};

#[derive(Debug, Clone)]
struct Captured {
    authorization: Option<String>,
    content_type: Option<String>,
    body: Bytes,
}

#[derive(Clone)]
struct Collector {
    status: Arc<AtomicU16>,
    seen: Arc<Mutex<Vec<Captured>>>,
}

impl Collector {
    fn batches(&self) -> Vec<ExportRequest> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|c| otlp::decode(&c.body).unwrap())
            .collect()
    }
}

async fn ingest(
    State(c): State<Collector>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let h = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    c.seen.lock().unwrap().push(Captured {
        authorization: h(header::AUTHORIZATION),
        content_type: h(header::CONTENT_TYPE),
        body,
    });
    let status = StatusCode::from_u16(c.status.load(Ordering::SeqCst)).unwrap();
    (status, if status.is_success() { "ok" } else { "collector unavailable" })
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_collector(status: u16) -> (String, Collector) {
    let c = Collector {
        status: Arc::new(AtomicU16::new(status)),
        seen: Arc::new(Mutex::new(vec![])),
    };
    let app = Router::new()
        .route("/v1/metrics", post(ingest))
        .with_state(c.clone());
    let addr = serve(app).await;
    (format!("http://{addr}/v1/metrics"), c)
}

fn state(collector_url: &str, extra: &str) -> AppState {
    let yaml = format!(
        "version: 1\ntelemetry:\n  collector_url: \"{collector_url}\"\n  api_key: \"test-key\"\n  flush_period_ms: 3600000\n  shutdown_timeout_ms: 2000\n{extra}"
    );
    AppState::new(config::load_from_str(&yaml).unwrap()).unwrap()
}

fn int_value(batch: &ExportRequest, name: &str) -> i64 {
    let rec = batch.find(name).unwrap_or_else(|| panic!("missing {name}"));
    rec.data_points()[0].value.as_i64().unwrap()
}

fn instrumented_service(st: &AppState) -> Router {
    router::instrument(
        Router::new()
            .route("/api/order/menu", get(|| async { "menu" }))
            .route("/api/order", post(|| async { "created" }))
            .route(
                "/api/slow",
                get(|| async {
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    "slow"
                }),
            ),
        st.telemetry(),
    )
}

#[tokio::test]
async fn request_mix_reaches_the_collector() {
    let (url, collector) = spawn_collector(200).await;
    let st = state(&url, "");
    let handle = st.scheduler().spawn();

    let base = format!("http://{}", serve(instrumented_service(&st)).await);
    let client = reqwest::Client::new();
    for _ in 0..3 {
        client.get(format!("{base}/api/order/menu")).send().await.unwrap();
    }
    for _ in 0..2 {
        client.post(format!("{base}/api/order")).send().await.unwrap();
    }

    let outcome = handle.flush_now().await;
    assert!(outcome.is_pushed(), "{outcome:?}");

    let seen = collector.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].authorization.as_deref(), Some("Bearer test-key"));
    assert_eq!(seen[0].content_type.as_deref(), Some("application/json"));

    let batch = otlp::decode(&seen[0].body).unwrap();
    assert_eq!(outcome, ExportOutcome::Pushed(batch.metric_count()));
    assert_eq!(int_value(&batch, "http_requests_total"), 5);
    assert_eq!(int_value(&batch, "http_requests_get"), 3);
    assert_eq!(int_value(&batch, "http_requests_post"), 2);
    assert_eq!(int_value(&batch, "http_requests_put"), 0);
    assert_eq!(int_value(&batch, "http_requests_delete"), 0);

    let menu = batch
        .find_with("http_requests_endpoint", "endpoint", "GET /api/order/menu")
        .unwrap();
    assert_eq!(menu.data_points()[0].value.as_i64(), Some(3));

    for name in ["cpu_percent", "memory_percent"] {
        let rec = batch.find(name).unwrap();
        assert!(matches!(rec.data, MetricData::Gauge(_)));
        let v = rec.data_points()[0].value.as_f64();
        assert!((0.0..=100.0).contains(&v), "{name}={v}");
    }

    // raw wire shape: cumulative monotonic sums
    let raw: serde_json::Value = serde_json::from_slice(&seen[0].body).unwrap();
    let metrics = &raw["resourceMetrics"][0]["scopeMetrics"][0]["metrics"];
    let total = metrics
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["name"] == "http_requests_total")
        .unwrap();
    assert_eq!(total["sum"]["isMonotonic"], true);
    assert_eq!(total["sum"]["aggregationTemporality"], "AGGREGATION_TEMPORALITY_CUMULATIVE");

    assert!(handle.shutdown().await.is_pushed());
}

#[tokio::test]
async fn rejection_does_not_stop_later_exports() {
    let (url, collector) = spawn_collector(503).await;
    let st = state(&url, "");
    let handle = st.scheduler().spawn();

    assert_eq!(handle.flush_now().await, ExportOutcome::Rejected(503));
    assert_eq!(collector.seen.lock().unwrap().len(), 1);

    collector.status.store(200, Ordering::SeqCst);
    assert!(handle.flush_now().await.is_pushed());

    // counters are cumulative, so the rejected interval is not lost
    st.telemetry().on_auth_success();
    assert!(handle.shutdown().await.is_pushed());
    let batches = collector.batches();
    assert_eq!(batches.len(), 3);
    assert_eq!(int_value(&batches[2], "auth_attempts_success"), 1);
}

#[tokio::test]
async fn unreachable_collector_is_a_transport_failure() {
    let addr = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap()
    };
    let st = state(&format!("http://{addr}/v1/metrics"), "");
    let handle = st.scheduler().spawn();

    assert_eq!(handle.flush_now().await, ExportOutcome::TransportFailed);
    assert_eq!(handle.shutdown().await, ExportOutcome::TransportFailed);
}

#[tokio::test]
async fn reset_latency_samples_land_in_exactly_one_batch() {
    const REQUESTS: usize = 40;

    let (url, collector) = spawn_collector(200).await;
    let st = state(&url, "  latency_reset_on_flush: true\n");
    let handle = st.scheduler().spawn();
    let base = format!("http://{}", serve(instrumented_service(&st)).await);

    let client = reqwest::Client::new();
    let mut calls = tokio::task::JoinSet::new();
    for _ in 0..REQUESTS {
        let client = client.clone();
        let url = format!("{base}/api/slow");
        calls.spawn(async move { client.get(url).send().await.unwrap().status() });
    }

    let mut flushes = 0;
    while !calls.is_empty() {
        if handle.flush_now().await.is_pushed() {
            flushes += 1;
        }
        tokio::select! {
            Some(done) = calls.join_next() => assert!(done.unwrap().is_success()),
            _ = tokio::time::sleep(std::time::Duration::from_millis(2)) => {}
        }
    }
    assert!(handle.shutdown().await.is_pushed());
    assert!(flushes >= 1);

    let exported: i64 = collector
        .batches()
        .iter()
        .map(|b| {
            b.find("request_latency_count")
                .and_then(|m| m.data_points()[0].value.as_i64())
                .unwrap_or(0)
        })
        .sum();
    assert_eq!(exported, REQUESTS as i64);

    let total = collector.batches().last().map(|b| int_value(b, "http_requests_total"));
    assert_eq!(total, Some(REQUESTS as i64));
}
