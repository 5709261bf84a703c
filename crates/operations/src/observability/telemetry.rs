//! Logging and trace-export initialization.
//!
//! One call wires the whole tracing stack: an `EnvFilter` honoring
//! `RUST_LOG`, a stdout fmt layer, an optional append-file layer, and an
//! optional OTLP span-export layer when a collector endpoint is configured.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ObservabilityConfig;

const SERVICE_NAME: &str = "seqd";

/// Keeps the OTLP provider alive and flushes spans on drop.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            let _ = provider.shutdown();
        }
    }
}

/// Initialize logging and optional trace export from configuration.
///
/// Call once at process start. Returns a guard that must be held for the
/// process lifetime so batched spans are flushed on exit.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let stdout_layer = fmt::layer();

    let file_layer = if config.log_to_file {
        let path = Path::new(&config.log_file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
    } else {
        None
    };

    let (otel_layer, provider) = if config.tracing_url.is_empty() {
        (None, None)
    } else {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(config.tracing_url.clone())
            .build()
            .context("failed to create OTLP exporter")?;
        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(
                Resource::builder()
                    .with_service_name(SERVICE_NAME)
                    .build(),
            )
            .build();
        let tracer = provider.tracer(SERVICE_NAME);
        (
            Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            Some(provider),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .with(otel_layer)
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    Ok(TelemetryGuard { provider })
}
