//! otelpush core: wire-level metric records and the shared error type.
//!
//! This crate defines the OTLP-shaped JSON batch pushed to the collector and
//! the error surface shared by the agent and facade crates. It carries no
//! runtime, network, or OS dependencies so the wire contract can be tested
//! (and decoded by tooling) in isolation.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `OtelPushError`/`Result`; telemetry must
//! never take down the service it instruments.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ErrorKind, OtelPushError, Result};
