//! Metric registry: counters, gauges, and latency accumulators.
//!
//! Values are atomics stored in `DashMap`s keyed by name plus a sorted
//! attribute vector. Increments on different series only meet on the shared
//! side of the gate below; the counters themselves saturate at `u64::MAX`
//! instead of wrapping, so a reported value never goes down.
//!
//! A registry-wide `RwLock<()>` gate separates the two activity sources:
//! every mutation holds it shared, `snapshot`/`snapshot_and_reset` hold it
//! exclusively. An increment therefore lands either entirely before a snapshot
//! (and is reported, then possibly reset) or entirely after it (and survives
//! the reset). The exclusive section only copies atomics, so request tasks
//! wait at most for one copy pass.
//!
//! Latency families are fixed at construction with their [`ResetPolicy`];
//! counters are always cumulative for the lifetime of the process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;

use otelpush_core::error::{OtelPushError, Result};

/// Reset policy of a latency family, declared once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicy {
    /// Accumulates for the lifetime of the process.
    Cumulative,
    /// Zeroed atomically right after each export snapshot.
    ResetOnFlush,
}

/// Flattened, sorted attribute set.
type Labels = Vec<(String, String)>;

fn labels(attrs: &[(&str, &str)]) -> Labels {
    let mut key: Labels = attrs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

struct CounterCell {
    unit: String,
    value: AtomicU64,
}

struct GaugeCell {
    unit: String,
    // f64 bits
    value: AtomicU64,
}

#[derive(Default)]
struct LatencyCell {
    total_ms: AtomicU64,
    count: AtomicU64,
}

struct LatencyFamily {
    policy: ResetPolicy,
    // "" = family-wide accumulator
    cells: DashMap<String, LatencyCell>,
}

/// `{total_ms, count}` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyAccumulator {
    pub total_ms: u64,
    pub count: u64,
}

impl LatencyAccumulator {
    /// `total_ms / count`, exactly 0 when nothing was recorded.
    pub fn average_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.count as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSample {
    pub name: String,
    pub unit: String,
    pub attributes: Vec<(String, String)>,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GaugeSample {
    pub name: String,
    pub unit: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencySample {
    pub family: String,
    /// `None` for the family-wide accumulator.
    pub endpoint: Option<String>,
    pub policy: ResetPolicy,
    pub accumulator: LatencyAccumulator,
}

/// Immutable point-in-time copy of the registry, sorted by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrySnapshot {
    pub counters: Vec<CounterSample>,
    pub gauges: Vec<GaugeSample>,
    pub latencies: Vec<LatencySample>,
}

impl RegistrySnapshot {
    /// Value of the attribute-less counter `name`.
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters
            .iter()
            .find(|c| c.name == name && c.attributes.is_empty())
            .map(|c| c.value)
    }

    /// Value of counter `name` carrying attribute `key=value`.
    pub fn counter_with(&self, name: &str, key: &str, value: &str) -> Option<u64> {
        self.counters
            .iter()
            .find(|c| c.name == name && c.attributes.iter().any(|(k, v)| k == key && v == value))
            .map(|c| c.value)
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.iter().find(|g| g.name == name).map(|g| g.value)
    }

    pub fn latency(&self, family: &str, endpoint: Option<&str>) -> Option<LatencyAccumulator> {
        self.latencies
            .iter()
            .find(|l| l.family == family && l.endpoint.as_deref() == endpoint)
            .map(|l| l.accumulator)
    }
}

/// Declares counters and latency families before the registry is shared.
#[derive(Default)]
pub struct RegistryBuilder {
    counters: Vec<(String, String)>,
    latencies: Vec<(String, ResetPolicy)>,
}

impl RegistryBuilder {
    /// Pre-register an attribute-less counter at zero.
    pub fn counter(mut self, name: &str, unit: &str) -> Self {
        self.counters.push((name.to_string(), unit.to_string()));
        self
    }

    /// Declare a latency family and its reset policy.
    pub fn latency(mut self, family: &str, policy: ResetPolicy) -> Self {
        self.latencies.push((family.to_string(), policy));
        self
    }

    pub fn build(self) -> MetricRegistry {
        let counters = DashMap::new();
        for (name, unit) in self.counters {
            counters.insert(
                (name, Labels::new()),
                CounterCell {
                    unit,
                    value: AtomicU64::new(0),
                },
            );
        }

        let latencies = self
            .latencies
            .into_iter()
            .map(|(family, policy)| {
                (
                    family,
                    LatencyFamily {
                        policy,
                        cells: DashMap::new(),
                    },
                )
            })
            .collect();

        MetricRegistry {
            gate: RwLock::new(()),
            counters,
            gauges: DashMap::new(),
            latencies,
        }
    }
}

pub struct MetricRegistry {
    gate: RwLock<()>,
    counters: DashMap<(String, Labels), CounterCell>,
    gauges: DashMap<String, GaugeCell>,
    latencies: HashMap<String, LatencyFamily>,
}

impl MetricRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    // Poisoning only means a panic elsewhere while holding the gate; the
    // guarded data is `()`, so recovering is always sound.
    fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(|e| e.into_inner())
    }

    fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Add `delta` to counter `name` with the given attributes, creating it on
    /// first use. The unit is fixed by whoever creates the series.
    pub fn increment_counter(&self, name: &str, unit: &str, delta: u64, attrs: &[(&str, &str)]) {
        let _g = self.shared();
        let cell = self
            .counters
            .entry((name.to_string(), labels(attrs)))
            .or_insert_with(|| CounterCell {
                unit: unit.to_string(),
                value: AtomicU64::new(0),
            });
        saturating_add(&cell.value, delta);
    }

    /// Overwrite gauge `name` with the latest reading.
    pub fn set_gauge(&self, name: &str, unit: &str, value: f64) {
        let _g = self.shared();
        let bits = value.to_bits();
        if let Some(cell) = self.gauges.get(name) {
            cell.value.store(bits, Ordering::Relaxed);
            return;
        }
        self.gauges
            .entry(name.to_string())
            .or_insert_with(|| GaugeCell {
                unit: unit.to_string(),
                value: AtomicU64::new(bits),
            })
            .value
            .store(bits, Ordering::Relaxed);
    }

    /// Record one latency sample in `family`, optionally under `endpoint`.
    /// Fails for families that were never declared.
    pub fn add_latency_sample(
        &self,
        family: &str,
        endpoint: Option<&str>,
        duration_ms: u64,
    ) -> Result<()> {
        let fam = self
            .latencies
            .get(family)
            .ok_or_else(|| OtelPushError::UndeclaredMetric(family.to_string()))?;

        let _g = self.shared();
        let cell = fam
            .cells
            .entry(endpoint.unwrap_or_default().to_string())
            .or_default();
        saturating_add(&cell.total_ms, duration_ms);
        saturating_add(&cell.count, 1);
        Ok(())
    }

    pub fn has_interval_reset(&self) -> bool {
        self.latencies
            .values()
            .any(|f| f.policy == ResetPolicy::ResetOnFlush)
    }

    /// Consistent copy of all current values.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let _g = self.exclusive();
        self.copy_values()
    }

    /// Zero every `ResetOnFlush` accumulator.
    pub fn reset_interval_scoped(&self) {
        let _g = self.exclusive();
        self.zero_interval_scoped();
    }

    /// Snapshot, then reset interval-scoped accumulators, as one unit with
    /// respect to concurrent mutation.
    pub fn snapshot_and_reset(&self) -> RegistrySnapshot {
        let _g = self.exclusive();
        let snap = self.copy_values();
        self.zero_interval_scoped();
        snap
    }

    fn copy_values(&self) -> RegistrySnapshot {
        let mut counters: Vec<CounterSample> = self
            .counters
            .iter()
            .map(|r| CounterSample {
                name: r.key().0.clone(),
                unit: r.value().unit.clone(),
                attributes: r.key().1.clone(),
                value: r.value().value.load(Ordering::Relaxed),
            })
            .collect();
        counters.sort_by(|a, b| (&a.name, &a.attributes).cmp(&(&b.name, &b.attributes)));

        let mut gauges: Vec<GaugeSample> = self
            .gauges
            .iter()
            .map(|r| GaugeSample {
                name: r.key().clone(),
                unit: r.value().unit.clone(),
                value: f64::from_bits(r.value().value.load(Ordering::Relaxed)),
            })
            .collect();
        gauges.sort_by(|a, b| a.name.cmp(&b.name));

        let mut latencies = Vec::new();
        for (family, fam) in &self.latencies {
            for r in fam.cells.iter() {
                let endpoint = if r.key().is_empty() {
                    None
                } else {
                    Some(r.key().clone())
                };
                latencies.push(LatencySample {
                    family: family.clone(),
                    endpoint,
                    policy: fam.policy,
                    accumulator: LatencyAccumulator {
                        total_ms: r.value().total_ms.load(Ordering::Relaxed),
                        count: r.value().count.load(Ordering::Relaxed),
                    },
                });
            }
        }
        latencies.sort_by(|a, b| (&a.family, &a.endpoint).cmp(&(&b.family, &b.endpoint)));

        RegistrySnapshot {
            counters,
            gauges,
            latencies,
        }
    }

    fn zero_interval_scoped(&self) {
        for fam in self.latencies.values() {
            if fam.policy != ResetPolicy::ResetOnFlush {
                continue;
            }
            for cell in fam.cells.iter() {
                cell.total_ms.store(0, Ordering::Relaxed);
                cell.count.store(0, Ordering::Relaxed);
            }
        }
    }
}

fn saturating_add(cell: &AtomicU64, delta: u64) {
    // the closure always returns Some, so the update cannot fail
    let _ = cell.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
        Some(v.saturating_add(delta))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn registry(policy: ResetPolicy) -> MetricRegistry {
        MetricRegistry::builder()
            .counter("requests", "1")
            .latency("latency", policy)
            .build()
    }

    #[test]
    fn declared_counters_start_at_zero() {
        let reg = registry(ResetPolicy::Cumulative);
        assert_eq!(reg.snapshot().counter("requests"), Some(0));
    }

    #[test]
    fn counters_accumulate_per_attribute_set() {
        let reg = registry(ResetPolicy::Cumulative);
        reg.increment_counter("requests", "1", 1, &[]);
        reg.increment_counter("requests", "1", 2, &[]);
        reg.increment_counter("hits", "1", 1, &[("endpoint", "GET /a")]);
        reg.increment_counter("hits", "1", 1, &[("endpoint", "GET /b")]);
        reg.increment_counter("hits", "1", 1, &[("endpoint", "GET /a")]);

        let snap = reg.snapshot();
        assert_eq!(snap.counter("requests"), Some(3));
        assert_eq!(snap.counter_with("hits", "endpoint", "GET /a"), Some(2));
        assert_eq!(snap.counter_with("hits", "endpoint", "GET /b"), Some(1));
    }

    #[test]
    fn attribute_order_does_not_split_series() {
        let reg = registry(ResetPolicy::Cumulative);
        reg.increment_counter("x", "1", 1, &[("a", "1"), ("b", "2")]);
        reg.increment_counter("x", "1", 1, &[("b", "2"), ("a", "1")]);
        let snap = reg.snapshot();
        assert_eq!(snap.counters.iter().filter(|c| c.name == "x").count(), 1);
        assert_eq!(snap.counter_with("x", "a", "1"), Some(2));
    }

    #[test]
    fn gauge_keeps_latest_only() {
        let reg = registry(ResetPolicy::Cumulative);
        reg.set_gauge("temp", "C", 10.0);
        reg.set_gauge("temp", "C", 12.5);
        assert_eq!(reg.snapshot().gauge("temp"), Some(12.5));
    }

    #[test]
    fn average_is_zero_without_samples() {
        assert_eq!(LatencyAccumulator::default().average_ms(), 0.0);
        let acc = LatencyAccumulator {
            total_ms: 30,
            count: 4,
        };
        assert_eq!(acc.average_ms(), 7.5);
    }

    #[test]
    fn undeclared_latency_family_is_rejected() {
        let reg = registry(ResetPolicy::Cumulative);
        let err = reg.add_latency_sample("nope", None, 5).unwrap_err();
        assert_eq!(err.kind().as_str(), "UNDECLARED_METRIC");
    }

    #[test]
    fn cumulative_latency_survives_reset() {
        let reg = registry(ResetPolicy::Cumulative);
        reg.add_latency_sample("latency", None, 10).unwrap();
        reg.add_latency_sample("latency", Some("GET /a"), 20).unwrap();
        let snap = reg.snapshot_and_reset();
        assert_eq!(
            snap.latency("latency", None),
            Some(LatencyAccumulator {
                total_ms: 10,
                count: 1,
            })
        );

        let after = reg.snapshot();
        assert_eq!(
            after.latency("latency", Some("GET /a")),
            Some(LatencyAccumulator {
                total_ms: 20,
                count: 1,
            })
        );
        assert!(!reg.has_interval_reset());
    }

    #[test]
    fn interval_latency_is_zeroed_after_snapshot() {
        let reg = registry(ResetPolicy::ResetOnFlush);
        reg.add_latency_sample("latency", None, 10).unwrap();
        reg.add_latency_sample("latency", None, 30).unwrap();
        reg.increment_counter("requests", "1", 2, &[]);

        let snap = reg.snapshot_and_reset();
        assert_eq!(snap.latency("latency", None).unwrap().average_ms(), 20.0);

        let after = reg.snapshot();
        assert_eq!(after.latency("latency", None), Some(LatencyAccumulator::default()));
        // counters are never reset
        assert_eq!(after.counter("requests"), Some(2));
    }

    #[test]
    fn reset_interval_scoped_leaves_cumulative_families() {
        let reg = MetricRegistry::builder()
            .latency("lifetime", ResetPolicy::Cumulative)
            .latency("interval", ResetPolicy::ResetOnFlush)
            .build();
        reg.add_latency_sample("lifetime", None, 5).unwrap();
        reg.add_latency_sample("interval", None, 5).unwrap();
        reg.reset_interval_scoped();

        let snap = reg.snapshot();
        assert_eq!(snap.latency("lifetime", None).unwrap().count, 1);
        assert_eq!(snap.latency("interval", None).unwrap().count, 0);
        let interval = snap.latencies.iter().find(|l| l.family == "interval").unwrap();
        assert_eq!(interval.policy, ResetPolicy::ResetOnFlush);
    }

    #[test]
    fn counters_and_latency_saturate_instead_of_wrapping() {
        let reg = registry(ResetPolicy::Cumulative);
        reg.increment_counter("requests", "1", u64::MAX, &[]);
        reg.increment_counter("requests", "1", 2, &[]);
        reg.add_latency_sample("latency", None, u64::MAX).unwrap();
        reg.add_latency_sample("latency", None, 7).unwrap();

        let snap = reg.snapshot();
        assert_eq!(snap.counter("requests"), Some(u64::MAX));
        assert_eq!(
            snap.latency("latency", None),
            Some(LatencyAccumulator {
                total_ms: u64::MAX,
                count: 2,
            })
        );
    }

    #[test]
    fn concurrent_increments_are_not_lost_across_resets() {
        let reg = Arc::new(registry(ResetPolicy::ResetOnFlush));
        let writers: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        reg.increment_counter("requests", "1", 1, &[]);
                        reg.add_latency_sample("latency", None, 1).unwrap();
                    }
                })
            })
            .collect();

        let mut reported = 0;
        for _ in 0..50 {
            let snap = reg.snapshot_and_reset();
            reported += snap.latency("latency", None).map(|a| a.count).unwrap_or(0);
        }
        for w in writers {
            w.join().unwrap();
        }
        reported += reg
            .snapshot_and_reset()
            .latency("latency", None)
            .map(|a| a.count)
            .unwrap_or(0);

        assert_eq!(reported, 8_000);
        assert_eq!(reg.snapshot().counter("requests"), Some(8_000));
    }
}
