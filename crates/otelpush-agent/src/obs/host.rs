//! Host sampler: CPU load and memory utilisation as percentages.
//!
//! Readings come from a [`HostProbe`]; the percentage maths is a pure function
//! of what the probe returns. A probe failure never propagates: the reading
//! falls back to 0 and a warning is logged.

use std::sync::Arc;

use sysinfo::System;

use otelpush_core::error::{OtelPushError, Result};

use crate::config::PercentPrecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReading {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

/// Source of raw OS counters.
pub trait HostProbe: Send + Sync {
    fn load_average_1m(&self) -> Result<f64>;
    fn logical_cores(&self) -> Result<usize>;
    fn memory(&self) -> Result<MemoryReading>;
}

/// `sysinfo`-backed probe. Holds no state between calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn load_average_1m(&self) -> Result<f64> {
        let load = System::load_average();
        if load.one.is_finite() && load.one >= 0.0 {
            Ok(load.one)
        } else {
            Err(OtelPushError::Sampling(format!("invalid load average: {}", load.one)))
        }
    }

    fn logical_cores(&self) -> Result<usize> {
        let mut sys = System::new();
        sys.refresh_cpu();
        let n = sys.cpus().len();
        if n > 0 {
            return Ok(n);
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .map_err(|e| OtelPushError::Sampling(format!("cpu count unavailable: {e}")))
    }

    fn memory(&self) -> Result<MemoryReading> {
        let mut sys = System::new();
        sys.refresh_memory();
        Ok(MemoryReading {
            total_bytes: sys.total_memory(),
            free_bytes: sys.free_memory(),
        })
    }
}

/// One sample of both host gauges, already rounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostReading {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

#[derive(Clone)]
pub struct HostSampler {
    probe: Arc<dyn HostProbe>,
    precision: PercentPrecision,
}

impl HostSampler {
    pub fn new(probe: Arc<dyn HostProbe>, precision: PercentPrecision) -> Self {
        Self { probe, precision }
    }

    pub fn system(precision: PercentPrecision) -> Self {
        Self::new(Arc::new(SystemProbe), precision)
    }

    pub fn precision(&self) -> PercentPrecision {
        self.precision
    }

    pub fn sample(&self) -> HostReading {
        HostReading {
            cpu_percent: self.sample_cpu_percent(),
            memory_percent: self.sample_memory_percent(),
        }
    }

    /// 1-minute load average per logical core, clamped to [0, 100].
    pub fn sample_cpu_percent(&self) -> f64 {
        match self.cpu_ratio() {
            Ok(r) => self.round((r * 100.0).clamp(0.0, 100.0)),
            Err(e) => {
                tracing::warn!(
                    kind = e.kind().as_str(),
                    error = %e,
                    "cpu sample unavailable; reporting 0"
                );
                0.0
            }
        }
    }

    /// `(total - free) / total`.
    pub fn sample_memory_percent(&self) -> f64 {
        match self.memory_ratio() {
            Ok(r) => self.round((r * 100.0).clamp(0.0, 100.0)),
            Err(e) => {
                tracing::warn!(
                    kind = e.kind().as_str(),
                    error = %e,
                    "memory sample unavailable; reporting 0"
                );
                0.0
            }
        }
    }

    fn cpu_ratio(&self) -> Result<f64> {
        let load = self.probe.load_average_1m()?;
        let cores = self.probe.logical_cores()?;
        if cores == 0 {
            return Err(OtelPushError::Sampling("zero logical cores reported".into()));
        }
        Ok(load / cores as f64)
    }

    fn memory_ratio(&self) -> Result<f64> {
        let m = self.probe.memory()?;
        if m.total_bytes == 0 {
            return Err(OtelPushError::Sampling("total memory reported as 0".into()));
        }
        let used = m.total_bytes.saturating_sub(m.free_bytes);
        Ok(used as f64 / m.total_bytes as f64)
    }

    fn round(&self, pct: f64) -> f64 {
        match self.precision {
            PercentPrecision::Integer => pct.round(),
            PercentPrecision::Hundredths => (pct * 100.0).round() / 100.0,
        }
    }
}
