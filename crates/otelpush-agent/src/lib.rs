//! otelpush agent library entry.
//!
//! This crate wires the in-process aggregation state, the request
//! interceptor, and the export pipeline into one telemetry stack for an axum
//! service. It is consumed by the demonstration binary (`main.rs`) and by
//! integration tests.

pub mod app_state;
pub mod config;
pub mod interceptor;
pub mod obs;
pub mod ops;
pub mod pipeline;
pub mod router;
pub mod telemetry;

pub use telemetry::Telemetry;
