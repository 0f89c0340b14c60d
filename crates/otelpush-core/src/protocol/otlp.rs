//! OTLP/HTTP JSON metric batch.
//!
//! Shape pushed per export tick:
//! `{"resourceMetrics":[{"scopeMetrics":[{"metrics":[<MetricRecord>...]}]}]}`
//!
//! Structural rules checked on decode:
//! - a record carries exactly one of `sum` / `gauge`;
//! - only `sum` carries `aggregationTemporality` and `isMonotonic`
//!   (`Gauge` denies unknown fields, so a gauge with those flags fails to decode);
//! - a point carries exactly one of `asInt` / `asDouble`.
//!
//! Records and points decode through private raw structs so that a body
//! carrying both keys is rejected instead of silently keeping one.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{OtelPushError, Result};

/// Top-level request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics {
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeMetrics {
    pub metrics: Vec<MetricRecord>,
}

/// One named metric with its data (sum or gauge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMetricRecord")]
pub struct MetricRecord {
    pub name: String,
    pub unit: String,
    #[serde(flatten)]
    pub data: MetricData,
}

#[derive(Deserialize)]
struct RawMetricRecord {
    name: String,
    unit: String,
    sum: Option<Sum>,
    gauge: Option<Gauge>,
}

impl TryFrom<RawMetricRecord> for MetricRecord {
    type Error = String;

    fn try_from(raw: RawMetricRecord) -> std::result::Result<Self, Self::Error> {
        let data = match (raw.sum, raw.gauge) {
            (Some(sum), None) => MetricData::Sum(sum),
            (None, Some(gauge)) => MetricData::Gauge(gauge),
            (Some(_), Some(_)) => {
                return Err(format!("metric {} has both sum and gauge", raw.name));
            }
            (None, None) => {
                return Err(format!("metric {} has neither sum nor gauge", raw.name));
            }
        };
        Ok(MetricRecord {
            name: raw.name,
            unit: raw.unit,
            data,
        })
    }
}

/// Serialized under the key `sum` or `gauge`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricData {
    Sum(Sum),
    Gauge(Gauge),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Sum {
    pub data_points: Vec<NumberDataPoint>,
    pub aggregation_temporality: AggregationTemporality,
    pub is_monotonic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Gauge {
    pub data_points: Vec<NumberDataPoint>,
}

/// Sums are always reported cumulatively (since process start, or since the
/// last declared reset for interval-reset accumulators).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationTemporality {
    #[serde(rename = "AGGREGATION_TEMPORALITY_CUMULATIVE")]
    Cumulative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawNumberDataPoint")]
pub struct NumberDataPoint {
    #[serde(flatten)]
    pub value: NumberValue,
    pub time_unix_nano: u64,
    pub attributes: Vec<KeyValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNumberDataPoint {
    as_int: Option<i64>,
    as_double: Option<f64>,
    time_unix_nano: u64,
    attributes: Vec<KeyValue>,
}

impl TryFrom<RawNumberDataPoint> for NumberDataPoint {
    type Error = &'static str;

    fn try_from(raw: RawNumberDataPoint) -> std::result::Result<Self, Self::Error> {
        let value = match (raw.as_int, raw.as_double) {
            (Some(v), None) => NumberValue::AsInt(v),
            (None, Some(v)) => NumberValue::AsDouble(v),
            (Some(_), Some(_)) => return Err("data point has both asInt and asDouble"),
            (None, None) => return Err("data point has neither asInt nor asDouble"),
        };
        Ok(NumberDataPoint {
            value,
            time_unix_nano: raw.time_unix_nano,
            attributes: raw.attributes,
        })
    }
}

/// Serialized under the key `asInt` or `asDouble`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NumberValue {
    AsInt(i64),
    AsDouble(f64),
}

impl NumberValue {
    pub fn as_f64(self) -> f64 {
        match self {
            NumberValue::AsInt(v) => v as f64,
            NumberValue::AsDouble(v) => v,
        }
    }

    pub fn as_i64(self) -> Option<i64> {
        match self {
            NumberValue::AsInt(v) => Some(v),
            NumberValue::AsDouble(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

impl KeyValue {
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: AnyValue {
                string_value: value.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    pub string_value: String,
}

impl MetricRecord {
    /// Cumulative, monotonic sum with a single integer point.
    pub fn sum(
        name: impl Into<String>,
        unit: impl Into<String>,
        value: u64,
        time_unix_nano: u64,
        attributes: Vec<KeyValue>,
    ) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            data: MetricData::Sum(Sum {
                data_points: vec![NumberDataPoint {
                    value: NumberValue::AsInt(i64::try_from(value).unwrap_or(i64::MAX)),
                    time_unix_nano,
                    attributes,
                }],
                aggregation_temporality: AggregationTemporality::Cumulative,
                is_monotonic: true,
            }),
        }
    }

    /// Point-in-time gauge with a single point.
    pub fn gauge(
        name: impl Into<String>,
        unit: impl Into<String>,
        value: NumberValue,
        time_unix_nano: u64,
        attributes: Vec<KeyValue>,
    ) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            data: MetricData::Gauge(Gauge {
                data_points: vec![NumberDataPoint {
                    value,
                    time_unix_nano,
                    attributes,
                }],
            }),
        }
    }

    pub fn data_points(&self) -> &[NumberDataPoint] {
        match &self.data {
            MetricData::Sum(s) => &s.data_points,
            MetricData::Gauge(g) => &g.data_points,
        }
    }

    pub fn is_sum(&self) -> bool {
        matches!(self.data, MetricData::Sum(_))
    }

    /// Value of the string attribute `key` on the first point, if any.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.data_points()
            .first()?
            .attributes
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| kv.value.string_value.as_str())
    }
}

impl ExportRequest {
    /// Wrap a flat list of records in the single resource/scope envelope.
    pub fn from_metrics(metrics: Vec<MetricRecord>) -> Self {
        Self {
            resource_metrics: vec![ResourceMetrics {
                scope_metrics: vec![ScopeMetrics { metrics }],
            }],
        }
    }

    pub fn metrics(&self) -> impl Iterator<Item = &MetricRecord> {
        self.resource_metrics
            .iter()
            .flat_map(|r| r.scope_metrics.iter())
            .flat_map(|s| s.metrics.iter())
    }

    pub fn metric_count(&self) -> usize {
        self.metrics().count()
    }

    /// First record named `name`.
    pub fn find(&self, name: &str) -> Option<&MetricRecord> {
        self.metrics().find(|m| m.name == name)
    }

    /// First record named `name` whose point carries `key=value`.
    pub fn find_with(&self, name: &str, key: &str, value: &str) -> Option<&MetricRecord> {
        self.metrics()
            .find(|m| m.name == name && m.attribute(key) == Some(value))
    }
}

/// Serialize a batch to the JSON request body.
pub fn encode(req: &ExportRequest) -> Result<Bytes> {
    let v = serde_json::to_vec(req)?;
    Ok(Bytes::from(v))
}

/// Parse a JSON request body.
pub fn decode(buf: &[u8]) -> Result<ExportRequest> {
    serde_json::from_slice(buf)
        .map_err(|e| OtelPushError::Serialization(format!("decode failed: {e}")))
}

/// Nanoseconds since the Unix epoch (0 if the clock is before the epoch).
pub fn unix_nanos(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
