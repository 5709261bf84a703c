//! Connection management and the periodic dispatch loop.

use std::sync::Arc;
use std::time::Duration;

use alloy_eips::eip2718::Encodable2718;
use tokio::sync::watch;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use sequencer_operations::SequencerMetrics;
use sequencer_pool::{Bundle, BundlePool};

use crate::error::DispatchError;
use crate::proto::bundle_service_client::BundleServiceClient;
use crate::proto::{
    Bundle as ProtoBundle, BundleTransaction, BundlesRequest, BundlesResponse,
};

/// Deadline applied to each dispatch RPC.
const RPC_DEADLINE: Duration = Duration::from_secs(5);

/// Minimum time allowed for a single connection attempt.
const MIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Exponential backoff settings for reconnection attempts.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// First retry delay.
    pub base_delay: Duration,
    /// Growth factor between retries.
    pub multiplier: f64,
    /// Delay ceiling.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 1.6,
            max_delay: Duration::from_secs(120),
        }
    }
}

/// Configuration for the dispatcher task.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Bundle merger endpoint, `host:port` or a full URI.
    pub endpoint: String,
    /// Negotiate TLS; certificates are verified against system roots.
    pub use_tls: bool,
    /// Tick interval between dispatches.
    pub interval: Duration,
    /// Maximum bundles per dispatch.
    pub batch_limit: usize,
    /// Reconnect backoff settings.
    pub backoff: BackoffConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:50051".to_string(),
            use_tls: false,
            interval: Duration::from_secs(1),
            batch_limit: 100,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Dial the merger, retrying with exponential backoff until connected.
///
/// Returns `None` when shutdown is signalled before a connection could be
/// established. The HTTP ingress keeps accepting bundles the whole time;
/// they simply wait in the pool.
pub async fn connect_with_backoff(
    config: &DispatcherConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<Channel> {
    let mut delay = config.backoff.base_delay;

    loop {
        tracing::info!(endpoint = %config.endpoint, "attempting to connect to bundle merger");
        match try_connect(config).await {
            Ok(channel) => {
                tracing::info!(endpoint = %config.endpoint, "connected to bundle merger");
                return Some(channel);
            }
            Err(err) => {
                tracing::warn!(
                    endpoint = %config.endpoint,
                    error = %err,
                    retry_in = ?delay,
                    "bundle merger connection failed"
                );
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return None,
        }
        delay = next_delay(delay, &config.backoff);
    }
}

async fn try_connect(config: &DispatcherConfig) -> Result<Channel, DispatchError> {
    let uri = endpoint_uri(&config.endpoint, config.use_tls);
    let mut endpoint = Endpoint::from_shared(uri)
        .map_err(|e| DispatchError::InvalidEndpoint(e.to_string()))?
        .connect_timeout(MIN_CONNECT_TIMEOUT);

    if config.use_tls {
        endpoint = endpoint
            .tls_config(ClientTlsConfig::new().with_native_roots())
            .map_err(|e| DispatchError::Tls(e.to_string()))?;
    }

    Ok(endpoint.connect().await?)
}

/// Qualify a bare `host:port` with the scheme implied by the TLS setting.
fn endpoint_uri(endpoint: &str, use_tls: bool) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else if use_tls {
        format!("https://{endpoint}")
    } else {
        format!("http://{endpoint}")
    }
}

fn next_delay(current: Duration, backoff: &BackoffConfig) -> Duration {
    current.mul_f64(backoff.multiplier).min(backoff.max_delay)
}

/// The periodic bundle sender.
pub struct Dispatcher {
    config: DispatcherConfig,
    pool: Arc<BundlePool>,
    metrics: SequencerMetrics,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, pool: Arc<BundlePool>, metrics: SequencerMetrics) -> Self {
        Self {
            config,
            pool,
            metrics,
        }
    }

    /// Run the dispatch loop until shutdown.
    ///
    /// On shutdown one final batch is sent before the task exits, so bundles
    /// admitted just before the signal are not silently stranded.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Some(channel) = connect_with_backoff(&self.config, &mut shutdown).await else {
            tracing::info!("dispatcher shut down before a merger connection was established");
            return;
        };
        let mut client = BundleServiceClient::new(channel);

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.dispatch_once(&mut client).await;
                }
                _ = shutdown.changed() => {
                    tracing::info!("dispatcher shutting down, sending final batch");
                    self.dispatch_once(&mut client).await;
                    break;
                }
            }
        }
    }

    /// One dispatch round: snapshot, send, apply acks.
    ///
    /// Bundles are snapshotted without marking; only a `success = true` ack
    /// removes one from circulation. Transport failures leave the pool
    /// exactly as it was.
    pub async fn dispatch_once(&self, client: &mut BundleServiceClient<Channel>) {
        let bundles = self
            .pool
            .snapshot_for_dispatch(self.config.batch_limit, false);
        if bundles.is_empty() {
            self.metrics.record_dispatch_round("skipped_empty");
            return;
        }

        let request = BundlesRequest {
            bundles: bundles.iter().map(|b| to_proto_bundle(b)).collect(),
        };

        let response =
            match tokio::time::timeout(RPC_DEADLINE, client.send_bundle_collections(request)).await
            {
                Err(_) => {
                    tracing::warn!(
                        bundles = bundles.len(),
                        "dispatch deadline exceeded, bundles remain pooled"
                    );
                    self.metrics.record_dispatch_round("transport_error");
                    return;
                }
                Ok(Err(status)) => {
                    tracing::warn!(
                        error = %status,
                        bundles = bundles.len(),
                        "dispatch failed, bundles remain pooled"
                    );
                    self.metrics.record_dispatch_round("transport_error");
                    return;
                }
                Ok(Ok(response)) => response.into_inner(),
            };

        self.apply_acks(&response);
        self.metrics.record_dispatch_round("success");
        tracing::info!(bundles_sent = bundles.len(), "bundles sent to merger");
    }

    /// Apply per-bundle acknowledgements, correlated by UUID.
    fn apply_acks(&self, response: &BundlesResponse) {
        for ack in &response.bundle_responses {
            if ack.success {
                match self.pool.mark_for_deletion(&ack.replacement_uuid) {
                    Ok(()) => {
                        tracing::info!(
                            uuid = %ack.replacement_uuid,
                            status = %ack.status,
                            "bundle processed successfully"
                        );
                    }
                    // Canceled or replaced between snapshot and ack.
                    Err(err) => {
                        tracing::warn!(
                            uuid = %ack.replacement_uuid,
                            error = %err,
                            "acked bundle no longer in pool"
                        );
                    }
                }
            } else {
                tracing::warn!(
                    uuid = %ack.replacement_uuid,
                    status = %ack.status,
                    "bundle processing failed, retained for retry"
                );
            }
        }
    }
}

/// Serialize a pool bundle into its wire form.
fn to_proto_bundle(bundle: &Bundle) -> ProtoBundle {
    ProtoBundle {
        transactions: bundle
            .txs
            .iter()
            .map(|tx| BundleTransaction {
                data: tx.encoded_2718(),
            })
            .collect(),
        replacement_uuid: bundle.replacement_uuid.clone(),
        block_number: bundle.block_number.clone(),
        min_timestamp: bundle.min_timestamp,
        max_timestamp: bundle.max_timestamp,
        reverting_tx_hashes: bundle.reverting_tx_hashes.clone(),
        builders: bundle.builders.clone(),
    }
}
