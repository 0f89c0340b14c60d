//! In-process aggregation state.
//!
//! Counters, gauges, and latency accumulators live in [`MetricRegistry`]
//! (atomics behind `DashMap`), last-seen timestamps in [`PresenceTracker`],
//! and instantaneous host readings come from [`HostSampler`]. Nothing here
//! knows about the network or the wire format.

pub mod host;
pub mod names;
pub mod presence;
pub mod registry;

pub use host::{HostProbe, HostReading, HostSampler, MemoryReading, SystemProbe};
pub use presence::{MonotonicClock, PresenceTracker};
pub use registry::{
    CounterSample, GaugeSample, LatencyAccumulator, LatencySample, MetricRegistry,
    RegistryBuilder, RegistrySnapshot, ResetPolicy,
};
