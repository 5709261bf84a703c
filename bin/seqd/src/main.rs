//! Sequencer daemon (seqd)
//!
//! Accepts signed Ethereum transaction bundles from authenticated searchers
//! over JSON-RPC, stages them in an ordered in-memory pool keyed by
//! replacement UUID, and periodically forwards batches to a bundle-merger
//! service over gRPC.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────┐  POST /sequencer/eth_sendBundle   ┌─────────────────────────┐
//!  │ Searcher │──────────────────────────────────►│          seqd           │
//!  └──────────┘  POST /sequencer/eth_cancelBundle │  ┌────────┐ ┌─────────┐ │
//!                                                 │  │ Ingress│ │  Pool   │ │
//!                                                 │  └────────┘ └─────────┘ │
//!  ┌───────────────┐      gRPC (BundleService)    │  ┌──────────┐ ┌───────┐ │
//!  │ Bundle merger │◄─────────────────────────────│  │Dispatcher│ │Cleanup│ │
//!  └───────────────┘                              │  └──────────┘ └───────┘ │
//!                                                 └─────────────────────────┘
//! ```
//!
//! The pool is the only shared mutable state; ingress, dispatcher and
//! cleanup interact exclusively through its operations. Nothing is
//! persisted: a restart loses all unacknowledged bundles by design.
//!
//! ## Usage
//!
//! ```bash
//! # Defaults: ingress on :8080, merger at 127.0.0.1:50051
//! seqd
//!
//! # Custom merger with TLS and metrics
//! seqd --grpc-url merger.internal:50051 --use-tls --enable-metrics
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;

use sequencer_dispatch::{BackoffConfig, Dispatcher, DispatcherConfig};
use sequencer_ingress::auth::UserStore;
use sequencer_ingress::rate_limit::RateLimits;
use sequencer_ingress::server::{router, serve, AppState};
use sequencer_operations::config::build_figment;
use sequencer_operations::{init_telemetry, MetricsRegistry, SequencerConfig, ShutdownCoordinator};
use sequencer_pool::{new_shared_pool, run_cleanup_job, SortPolicy};

#[derive(Debug, Parser)]
#[command(name = "seqd")]
#[command(about = "Transaction-bundle sequencer")]
#[command(version)]
struct Cli {
    /// Config YAML path
    #[arg(long)]
    config: Option<PathBuf>,

    /// URL for gRPC connection to the bundle merger
    #[arg(long)]
    grpc_url: Option<String>,

    /// Use TLS for the gRPC connection
    #[arg(long)]
    use_tls: bool,

    /// URL for the tracing endpoint (leave empty to disable tracing)
    #[arg(long)]
    tracing_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log to file and stdout instead of only stdout
    #[arg(long)]
    log_to_file: bool,

    /// Enable the Prometheus metrics endpoint
    #[arg(long)]
    enable_metrics: bool,

    /// HTTP ingress bind address
    #[arg(long)]
    http_addr: Option<String>,

    /// Bundle ordering policy (block-number, min-timestamp, max-timestamp,
    /// builder-priority)
    #[arg(long)]
    sort_policy: Option<String>,

    /// Dispatch tick interval in milliseconds
    #[arg(long)]
    dispatch_interval_ms: Option<u64>,

    /// Maximum bundles per dispatch
    #[arg(long)]
    dispatch_batch_limit: Option<usize>,

    /// Pool cleanup interval in milliseconds
    #[arg(long)]
    cleanup_interval_ms: Option<u64>,
}

/// Resolve configuration: defaults < YAML < `SEQ_` env < CLI flags.
fn resolve_config(cli: &Cli) -> Result<SequencerConfig> {
    let mut figment = build_figment(cli.config.as_deref());

    if let Some(v) = &cli.grpc_url {
        figment = figment.merge(("dispatch.grpc_url", v.as_str()));
    }
    if cli.use_tls {
        figment = figment.merge(("dispatch.use_tls", true));
    }
    if let Some(v) = &cli.tracing_url {
        figment = figment.merge(("observability.tracing_url", v.as_str()));
    }
    if let Some(v) = &cli.log_level {
        figment = figment.merge(("observability.log_level", v.as_str()));
    }
    if cli.log_to_file {
        figment = figment.merge(("observability.log_to_file", true));
    }
    if cli.enable_metrics {
        figment = figment.merge(("observability.enable_metrics", true));
    }
    if let Some(v) = &cli.http_addr {
        figment = figment.merge(("http.addr", v.as_str()));
    }
    if let Some(v) = &cli.sort_policy {
        figment = figment.merge(("pool.sort_policy", v.as_str()));
    }
    if let Some(v) = cli.dispatch_interval_ms {
        figment = figment.merge(("dispatch.interval_ms", v));
    }
    if let Some(v) = cli.dispatch_batch_limit {
        figment = figment.merge(("dispatch.batch_limit", v));
    }
    if let Some(v) = cli.cleanup_interval_ms {
        figment = figment.merge(("pool.cleanup_interval_ms", v));
    }

    let config: SequencerConfig = figment
        .extract()
        .context("failed to resolve configuration")?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let _telemetry = init_telemetry(&config.observability)?;

    tracing::info!("starting sequencer daemon");
    tracing::info!(
        grpc_url = %config.dispatch.grpc_url,
        use_tls = config.dispatch.use_tls,
        "merger gRPC configuration"
    );

    let sort_policy: SortPolicy = config
        .pool
        .sort_policy
        .parse()
        .map_err(|e: String| anyhow!(e))?;
    let pool = new_shared_pool(sort_policy);

    let registry = config
        .observability
        .enable_metrics
        .then(|| Arc::new(MetricsRegistry::new()));
    let metrics = registry
        .as_ref()
        .map(|r| r.sequencer.clone())
        .unwrap_or_default();

    let shutdown = ShutdownCoordinator::new();
    shutdown.listen_for_signals();

    // Cleanup job: periodic compaction of soft-deleted bundles.
    let cleanup_metrics = metrics.clone();
    tokio::spawn(run_cleanup_job(
        Arc::clone(&pool),
        Duration::from_millis(config.pool.cleanup_interval_ms),
        shutdown.subscribe(),
        move |duration| cleanup_metrics.observe_cleanup(duration),
    ));

    // Dispatcher: periodic push to the bundle merger.
    let dispatcher = Dispatcher::new(
        DispatcherConfig {
            endpoint: config.dispatch.grpc_url.clone(),
            use_tls: config.dispatch.use_tls,
            interval: Duration::from_millis(config.dispatch.interval_ms),
            batch_limit: config.dispatch.batch_limit,
            backoff: BackoffConfig::default(),
        },
        Arc::clone(&pool),
        metrics.clone(),
    );
    let dispatcher_task = tokio::spawn(dispatcher.run(shutdown.subscribe()));

    // HTTP ingress.
    let state = AppState::new(
        Arc::clone(&pool),
        Arc::new(UserStore::from_env()),
        Arc::new(RateLimits::new(
            config.http.per_client_rate_limit,
            config.http.global_rate_limit,
        )),
        registry,
    );
    let app = router(state);
    let addr = config.parsed_http_addr()?;
    let mut server_task = tokio::spawn(serve(addr, app, shutdown.subscribe()));

    tokio::select! {
        result = &mut server_task => {
            // The server only returns before a signal on a fatal error,
            // e.g. a failed bind.
            match result {
                Ok(Ok(())) => bail!("HTTP server exited unexpectedly"),
                Ok(Err(err)) => return Err(err).context("HTTP server failed"),
                Err(err) => return Err(err).context("HTTP server task panicked"),
            }
        }
        _ = shutdown.triggered() => {}
    }

    tracing::info!("shutting down servers");

    // HTTP connections first, then the dispatcher's final tick, each under
    // its own budget.
    shutdown.drain(server_task, dispatcher_task).await;

    tracing::info!("servers exited properly");
    Ok(())
}
