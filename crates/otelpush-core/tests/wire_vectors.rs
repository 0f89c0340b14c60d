//! OTLP batch vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use otelpush_core::protocol::otlp::{self, AggregationTemporality, MetricData, NumberValue};

fn load(name: &str) -> Vec<u8> {
    fs::read(format!("tests/vectors/{name}")).unwrap()
}

#[test]
fn decode_request_batch() {
    let req = otlp::decode(&load("batch_requests.json")).unwrap();
    assert_eq!(req.metric_count(), 3);

    let total = req.find("http_requests_total").unwrap();
    match &total.data {
        MetricData::Sum(sum) => {
            assert!(sum.is_monotonic);
            assert_eq!(sum.aggregation_temporality, AggregationTemporality::Cumulative);
            assert_eq!(sum.data_points[0].value, NumberValue::AsInt(5));
            assert_eq!(sum.data_points[0].time_unix_nano, 1_760_000_000_000_000_000);
        }
        MetricData::Gauge(_) => panic!("total must be a sum"),
    }
    assert_eq!(total.attribute("source"), Some("otelpush-service"));

    let cpu = req.find("cpu_percent").unwrap();
    assert!(!cpu.is_sum());
    assert_eq!(cpu.data_points()[0].value, NumberValue::AsDouble(37.25));
}

#[test]
fn decode_endpoint_attribute() {
    let req = otlp::decode(&load("endpoint_sum.json")).unwrap();
    let rec = req
        .find_with("http_requests_endpoint", "endpoint", "PUT /api/auth")
        .expect("endpoint record");
    assert_eq!(rec.data_points()[0].value.as_i64(), Some(12));
}

#[test]
fn reencode_is_stable() {
    let req = otlp::decode(&load("batch_requests.json")).unwrap();
    let bytes = otlp::encode(&req).unwrap();
    assert_eq!(otlp::decode(&bytes).unwrap(), req);
}

#[test]
fn delta_temporality_is_not_accepted() {
    let err = otlp::decode(&load("bad_temporality.json")).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "SERIALIZATION");
}
