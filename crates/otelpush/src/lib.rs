//! Top-level facade crate for otelpush.
//!
//! Re-exports the wire types and the agent library so services can depend on
//! a single crate and call `otelpush::agent::Telemetry` hooks directly.

pub mod core {
    pub use otelpush_core::*;
}

pub mod agent {
    pub use otelpush_agent::*;
}

pub use otelpush_agent::Telemetry;
