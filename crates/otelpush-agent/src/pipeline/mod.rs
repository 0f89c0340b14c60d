//! Export pipeline: frame building, the collector push, and the periodic tick.
//!
//! Tick order: host sample -> registry snapshot (+ interval reset) -> frame ->
//! export on a spawned task. Nothing here runs on the request path.

pub mod exporter;
pub mod frame;
pub mod scheduler;

pub use exporter::{ExportOutcome, Exporter, HttpSink, MetricSink};
pub use frame::{FrameBuilder, FrameInputs};
pub use scheduler::{Scheduler, SchedulerHandle};
