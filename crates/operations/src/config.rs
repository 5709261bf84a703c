//! Layered configuration for the sequencer daemon.
//!
//! Resolution order, lowest priority first: built-in defaults, a YAML config
//! file, `SEQ_`-prefixed environment variables (nested keys separated by
//! `__`, e.g. `SEQ_DISPATCH__GRPC_URL`), and finally CLI flag overrides
//! merged by the binary.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Root configuration for the sequencer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SequencerConfig {
    /// HTTP ingress configuration.
    pub http: HttpConfig,

    /// Downstream dispatcher configuration.
    pub dispatch: DispatchConfig,

    /// Bundle pool configuration.
    pub pool: PoolConfig,

    /// Logging, tracing and metrics configuration.
    pub observability: ObservabilityConfig,
}

/// HTTP ingress configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Address to bind the ingress server to.
    pub addr: String,
    /// Per-client request budget per minute.
    pub per_client_rate_limit: u32,
    /// Global request budget per minute.
    pub global_rate_limit: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            per_client_rate_limit: 3000,
            global_rate_limit: 10000,
        }
    }
}

/// Downstream dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Bundle merger gRPC endpoint, `host:port` or a full URL.
    pub grpc_url: String,
    /// Use TLS for the gRPC connection (certificates are verified).
    pub use_tls: bool,
    /// Dispatch tick interval in milliseconds.
    pub interval_ms: u64,
    /// Maximum bundles per dispatch.
    pub batch_limit: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            grpc_url: "127.0.0.1:50051".to_string(),
            use_tls: false,
            interval_ms: 1000,
            batch_limit: 100,
        }
    }
}

/// Bundle pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Ordering policy, fixed for the pool's lifetime. One of
    /// `block-number`, `min-timestamp`, `max-timestamp`, `builder-priority`.
    pub sort_policy: String,
    /// Interval between compactions of soft-deleted bundles, milliseconds.
    pub cleanup_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            sort_policy: "block-number".to_string(),
            cleanup_interval_ms: 5000,
        }
    }
}

/// Logging, tracing and metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,
    /// Also log to a file in addition to stdout.
    pub log_to_file: bool,
    /// Log file path, used when `log_to_file` is set.
    pub log_file: String,
    /// Serve Prometheus metrics on `/metrics`.
    pub enable_metrics: bool,
    /// OTLP HTTP endpoint for trace export; empty disables export.
    pub tracing_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "./logs/seqd.log".to_string(),
            enable_metrics: false,
            tracing_url: String::new(),
        }
    }
}

impl SequencerConfig {
    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.parsed_http_addr()?;
        if self.dispatch.interval_ms == 0 {
            bail!("dispatch.interval_ms must be positive");
        }
        if self.dispatch.batch_limit == 0 {
            bail!("dispatch.batch_limit must be positive");
        }
        if self.pool.cleanup_interval_ms == 0 {
            bail!("pool.cleanup_interval_ms must be positive");
        }
        if self.http.per_client_rate_limit == 0 || self.http.global_rate_limit == 0 {
            bail!("rate limits must be positive");
        }
        Ok(())
    }

    /// The HTTP bind address as a parsed `SocketAddr`.
    pub fn parsed_http_addr(&self) -> Result<SocketAddr> {
        self.http
            .addr
            .parse()
            .with_context(|| format!("invalid http.addr '{}'", self.http.addr))
    }
}

/// Build the layered figment: defaults < YAML file < `SEQ_` environment.
///
/// The binary merges CLI flag overrides on top before extracting.
pub fn build_figment(config_path: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(SequencerConfig::default()));
    if let Some(path) = config_path {
        figment = figment.merge(Yaml::file(path));
    }
    figment.merge(Env::prefixed("SEQ_").split("__"))
}
