//! Prometheus-compatible metrics collection.
//!
//! Central registry for the sequencer's operational metrics, exported in
//! Prometheus text format by the ingress `/metrics` endpoint when enabled.

use std::time::Duration;

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Per-status labels for bundle and transaction counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StatusLabels {
    pub status: String,
}

impl StatusLabels {
    fn from_success(success: bool) -> Self {
        Self {
            status: if success { "success" } else { "failed" }.to_string(),
        }
    }
}

/// Per-outcome labels for dispatch round counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: String,
}

/// Sequencer-level metrics.
#[derive(Clone)]
pub struct SequencerMetrics {
    /// Bundles accepted into or rejected from the pool at ingress.
    processed_bundles: Family<StatusLabels, Counter>,
    /// Transactions admitted or dropped during bundle decoding.
    processed_transactions: Family<StatusLabels, Counter>,
    /// Live (not soft-deleted) bundles currently in the pool.
    pool_live_bundles: Gauge,
    /// Dispatch rounds by outcome (success, transport_error, skipped_empty).
    dispatch_rounds: Family<OutcomeLabels, Counter>,
    /// Wall-clock duration of pool compactions in seconds.
    cleanup_duration_seconds: Histogram,
}

impl Default for SequencerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SequencerMetrics {
    /// Create a new set of sequencer metrics.
    pub fn new() -> Self {
        // Compactions are expected in the sub-millisecond range.
        let cleanup_buckets = exponential_buckets(0.0001, 2.0, 14);

        Self {
            processed_bundles: Family::default(),
            processed_transactions: Family::default(),
            pool_live_bundles: Gauge::default(),
            dispatch_rounds: Family::default(),
            cleanup_duration_seconds: Histogram::new(cleanup_buckets),
        }
    }

    /// Count an ingress bundle as processed or failed.
    pub fn record_bundle(&self, success: bool) {
        self.processed_bundles
            .get_or_create(&StatusLabels::from_success(success))
            .inc();
    }

    /// Count an ingress transaction as valid or dropped.
    pub fn record_transaction(&self, success: bool) {
        self.processed_transactions
            .get_or_create(&StatusLabels::from_success(success))
            .inc();
    }

    /// Update the live-bundle gauge.
    pub fn set_pool_live(&self, count: i64) {
        self.pool_live_bundles.set(count);
    }

    /// Count a dispatch round by outcome.
    pub fn record_dispatch_round(&self, outcome: &str) {
        self.dispatch_rounds
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    /// Observe a pool compaction duration.
    pub fn observe_cleanup(&self, duration: Duration) {
        self.cleanup_duration_seconds
            .observe(duration.as_secs_f64());
    }
}

/// Central metrics registry for the sequencer.
pub struct MetricsRegistry {
    registry: Registry,
    /// Sequencer-level metrics.
    pub sequencer: SequencerMetrics,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    /// Create a new registry with all sequencer metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let sequencer = SequencerMetrics::new();

        registry.register(
            "sequencer_processed_bundles",
            "Total number of processed bundles",
            sequencer.processed_bundles.clone(),
        );

        registry.register(
            "sequencer_processed_transactions",
            "Total number of processed transactions",
            sequencer.processed_transactions.clone(),
        );

        registry.register(
            "sequencer_pool_live_bundles",
            "Live bundles currently held in the pool",
            sequencer.pool_live_bundles.clone(),
        );

        registry.register(
            "sequencer_dispatch_rounds",
            "Dispatch rounds by outcome",
            sequencer.dispatch_rounds.clone(),
        );

        registry.register(
            "sequencer_cleanup_duration_seconds",
            "Pool compaction duration in seconds",
            sequencer.cleanup_duration_seconds.clone(),
        );

        Self {
            registry,
            sequencer,
        }
    }

    /// Encode all metrics in Prometheus text format.
    pub fn encode_prometheus(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            return String::from("# Error encoding metrics\n");
        }
        buffer
    }
}
