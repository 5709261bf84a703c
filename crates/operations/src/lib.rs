//! Operational plumbing for the sequencer daemon.
//!
//! This crate collects the concerns every long-running deployment of the
//! sequencer needs but no business logic depends on:
//!
//! - Layered configuration (defaults < YAML file < environment < CLI)
//! - Structured logging and optional OTLP trace export
//! - A Prometheus metrics registry
//! - Signal-driven graceful shutdown

pub mod config;
pub mod observability;
pub mod shutdown;

pub use config::SequencerConfig;
pub use observability::metrics::{MetricsRegistry, SequencerMetrics};
pub use observability::telemetry::{init_telemetry, TelemetryGuard};
pub use shutdown::ShutdownCoordinator;
