//! Logging, trace export and metrics.

pub mod metrics;
pub mod telemetry;
