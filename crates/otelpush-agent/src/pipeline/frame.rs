//! Frame builder: registry snapshot + host readings -> OTLP batch.
//!
//! Counters and latency totals/counts become cumulative monotonic sums; host
//! readings, active users, latency averages, and registry gauges become
//! gauges. Every point carries `source`, plus `endpoint` where one applies.

use otelpush_core::protocol::otlp::{ExportRequest, KeyValue, MetricRecord, NumberValue};

use crate::config::PercentPrecision;
use crate::obs::names;
use crate::obs::{HostReading, RegistrySnapshot};

/// Per-tick values that do not live in the registry.
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs {
    pub host: HostReading,
    pub precision: PercentPrecision,
    pub active_users: u64,
    pub time_unix_nano: u64,
}

#[derive(Debug, Clone)]
pub struct FrameBuilder {
    source: String,
}

impl FrameBuilder {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    fn base_attrs(&self) -> Vec<KeyValue> {
        vec![KeyValue::string(names::ATTR_SOURCE, self.source.as_str())]
    }

    fn attrs<'a>(&self, extra: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<KeyValue> {
        let mut out = self.base_attrs();
        out.extend(extra.into_iter().map(|(k, v)| KeyValue::string(k, v)));
        out
    }

    fn percent(value: f64, precision: PercentPrecision) -> NumberValue {
        match precision {
            PercentPrecision::Integer => NumberValue::AsInt(value.round() as i64),
            PercentPrecision::Hundredths => NumberValue::AsDouble(value),
        }
    }

    pub fn build(&self, snap: &RegistrySnapshot, inputs: FrameInputs) -> ExportRequest {
        let t = inputs.time_unix_nano;
        let mut metrics = Vec::with_capacity(
            snap.counters.len() + snap.gauges.len() + snap.latencies.len() * 3 + 3,
        );

        for c in &snap.counters {
            let extra = c.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()));
            metrics.push(MetricRecord::sum(&c.name, &c.unit, c.value, t, self.attrs(extra)));
        }

        for l in &snap.latencies {
            let extra: Vec<(&str, &str)> = l
                .endpoint
                .as_deref()
                .map(|e| (names::ATTR_ENDPOINT, e))
                .into_iter()
                .collect();
            metrics.push(MetricRecord::sum(
                format!("{}_total_ms", l.family),
                names::UNIT_MILLIS,
                l.accumulator.total_ms,
                t,
                self.attrs(extra.iter().copied()),
            ));
            metrics.push(MetricRecord::sum(
                format!("{}_count", l.family),
                names::UNIT_COUNT,
                l.accumulator.count,
                t,
                self.attrs(extra.iter().copied()),
            ));
            metrics.push(MetricRecord::gauge(
                format!("{}_avg_ms", l.family),
                names::UNIT_MILLIS,
                NumberValue::AsDouble(l.accumulator.average_ms()),
                t,
                self.attrs(extra.iter().copied()),
            ));
        }

        for g in &snap.gauges {
            metrics.push(MetricRecord::gauge(
                &g.name,
                &g.unit,
                NumberValue::AsDouble(g.value),
                t,
                self.base_attrs(),
            ));
        }

        metrics.push(MetricRecord::gauge(
            names::CPU_PERCENT,
            names::UNIT_PERCENT,
            Self::percent(inputs.host.cpu_percent, inputs.precision),
            t,
            self.base_attrs(),
        ));
        metrics.push(MetricRecord::gauge(
            names::MEMORY_PERCENT,
            names::UNIT_PERCENT,
            Self::percent(inputs.host.memory_percent, inputs.precision),
            t,
            self.base_attrs(),
        ));
        metrics.push(MetricRecord::gauge(
            names::ACTIVE_USERS,
            names::UNIT_COUNT,
            NumberValue::AsInt(i64::try_from(inputs.active_users).unwrap_or(i64::MAX)),
            t,
            self.base_attrs(),
        ));

        ExportRequest::from_metrics(metrics)
    }
}
