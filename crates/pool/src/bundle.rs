//! The bundle record stored in the pool.

use alloy_consensus::TxEnvelope;

/// A validated transaction bundle, as admitted by the ingress handler.
///
/// Bundles are atomic from the caller's perspective: the downstream merger is
/// expected to include all of `txs` in order or none of them. The pool treats
/// the record as opaque apart from `replacement_uuid` (its primary key) and
/// the fields consulted by the active [`crate::SortPolicy`].
#[derive(Clone, Debug)]
pub struct Bundle {
    /// Decoded transactions, in submission order. Never empty once admitted.
    pub txs: Vec<TxEnvelope>,
    /// Hex-encoded target block number, kept opaque except when sorting.
    pub block_number: String,
    /// Minimum timestamp for bundle validity, 0 meaning unset.
    pub min_timestamp: i64,
    /// Maximum timestamp for bundle validity, 0 meaning unset.
    pub max_timestamp: i64,
    /// Transaction hashes permitted to revert, passed through downstream.
    pub reverting_tx_hashes: Vec<String>,
    /// Primary key for replacement and cancellation. Generated on ingress
    /// when the caller omitted it.
    pub replacement_uuid: String,
    /// Downstream builder tags the bundle should be shared with.
    pub builders: Vec<String>,
}
