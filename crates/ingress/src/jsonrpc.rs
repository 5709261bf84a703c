//! JSON-RPC envelope and parameter types for the sequencer API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC method accepted by the send endpoint.
pub const ETH_SEND_BUNDLE_METHOD: &str = "eth_sendBundle";

/// JSON-RPC method accepted by the cancel endpoint.
pub const ETH_CANCEL_BUNDLE_METHOD: &str = "eth_cancelBundle";

/// A JSON-RPC 2.0 request envelope whose `params` is an array of `P`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest<P> {
    /// JSON-RPC version string; not enforced, echoed semantics only.
    #[serde(default)]
    pub jsonrpc: String,
    /// Request id, echoed in cancel replies.
    #[serde(default)]
    pub id: Value,
    /// Method name; must match the route's expected method.
    pub method: String,
    /// Per-bundle parameter objects.
    #[serde(default)]
    pub params: Vec<P>,
}

/// Parameters of one bundle in an `eth_sendBundle` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendBundleParams {
    /// Hex-encoded signed transactions, with or without a `0x` prefix.
    pub txs: Vec<String>,
    /// Hex-encoded target block number.
    #[serde(default)]
    pub block_number: String,
    /// Optional minimum timestamp, 0 meaning unset.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub min_timestamp: i64,
    /// Optional maximum timestamp, 0 meaning unset.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_timestamp: i64,
    /// Optional transaction hashes allowed to revert.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reverting_tx_hashes: Vec<String>,
    /// Optional replacement UUID; generated server-side when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub replacement_uuid: String,
    /// Optional builder names to share the bundle with.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub builders: Vec<String>,
}

/// Parameters of one bundle in an `eth_cancelBundle` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CancelBundleParams {
    /// UUID of the bundle to cancel.
    #[serde(default)]
    pub replacement_uuid: String,
}

/// Body of the HTTP 202 reply to `eth_sendBundle`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendBundleResponse {
    /// UUIDs admitted into the pool, in request order.
    pub processed_bundles: Vec<String>,
    /// UUIDs rejected (no valid transactions, or duplicate).
    pub failed_bundles: Vec<String>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}
