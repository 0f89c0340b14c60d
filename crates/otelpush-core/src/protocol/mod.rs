//! Protocol modules.
//!
//! The collector speaks OTLP over HTTP with JSON bodies. Only the subset the
//! agent emits is modelled: sums and gauges with integer or double points and
//! string-valued attributes.
//!
//! Encoding and decoding never panic: malformed input is reported as
//! `OtelPushError::Serialization`.

pub mod otlp;
