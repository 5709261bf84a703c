//! `eth_sendBundle` and `eth_cancelBundle` request handlers.
//!
//! Both handlers parse the raw body themselves so that framing failures can
//! be distinguished from per-bundle failures: bad framing is an HTTP-level
//! error with no pool effect, while a rejected bundle is just an entry in
//! the `failedBundles` partition of an otherwise successful reply.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use sequencer_pool::Bundle;

use crate::error::IngressError;
use crate::jsonrpc::{
    CancelBundleParams, JsonRpcRequest, SendBundleParams, SendBundleResponse,
    ETH_CANCEL_BUNDLE_METHOD, ETH_SEND_BUNDLE_METHOD,
};
use crate::server::AppState;
use crate::tx::{decode_raw_transaction, is_valid_transaction};

/// Handler for `POST /sequencer/eth_sendBundle`.
pub async fn handle_send_bundle(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(err) => return IngressError::BodyRead(err.to_string()).into_response(),
    };

    let request: JsonRpcRequest<SendBundleParams> = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => return IngressError::InvalidPayload(err.to_string()).into_response(),
    };

    if request.method != ETH_SEND_BUNDLE_METHOD {
        return IngressError::InvalidMethod(request.method).into_response();
    }
    if request.params.is_empty() {
        return IngressError::MissingParams.into_response();
    }

    let response = process_send_bundle(&state, request.params);
    (StatusCode::ACCEPTED, Json(response)).into_response()
}

/// Admit each bundle independently; failures never abort the request.
fn process_send_bundle(state: &AppState, params: Vec<SendBundleParams>) -> SendBundleResponse {
    let mut processed_bundles = Vec::new();
    let mut failed_bundles = Vec::new();

    for mut params in params {
        if params.replacement_uuid.is_empty() {
            let generated = Uuid::new_v4().to_string();
            tracing::info!(uuid = %generated, "generated new UUID for bundle");
            params.replacement_uuid = generated;
        }

        let mut valid_txs = Vec::new();
        for raw in &params.txs {
            match decode_raw_transaction(raw) {
                Ok(tx) if is_valid_transaction(&tx) => {
                    tracing::debug!(
                        hash = %tx.tx_hash(),
                        "valid transaction"
                    );
                    state.metrics.record_transaction(true);
                    valid_txs.push(tx);
                }
                Ok(tx) => {
                    tracing::warn!(hash = %tx.tx_hash(), "skipping invalid transaction");
                    state.metrics.record_transaction(false);
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to decode transaction");
                    state.metrics.record_transaction(false);
                }
            }
        }

        if valid_txs.is_empty() {
            tracing::warn!(
                uuid = %params.replacement_uuid,
                "no valid transactions in the bundle"
            );
            state.metrics.record_bundle(false);
            failed_bundles.push(params.replacement_uuid);
            continue;
        }

        let bundle = Bundle {
            txs: valid_txs,
            block_number: params.block_number,
            min_timestamp: params.min_timestamp,
            max_timestamp: params.max_timestamp,
            reverting_tx_hashes: params.reverting_tx_hashes,
            replacement_uuid: params.replacement_uuid.clone(),
            builders: params.builders,
        };

        match state.pool.add(bundle, false) {
            Ok(()) => {
                tracing::info!(
                    uuid = %params.replacement_uuid,
                    "bundle received and added to the pool"
                );
                state.metrics.record_bundle(true);
                processed_bundles.push(params.replacement_uuid);
            }
            Err(err) => {
                tracing::error!(
                    uuid = %params.replacement_uuid,
                    error = %err,
                    "failed to add bundle to pool"
                );
                state.metrics.record_bundle(false);
                failed_bundles.push(params.replacement_uuid);
            }
        }
    }

    SendBundleResponse {
        processed_bundles,
        failed_bundles,
    }
}

/// Handler for `POST /sequencer/eth_cancelBundle`.
pub async fn handle_cancel_bundle(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(err) => return IngressError::BodyRead(err.to_string()).into_response(),
    };

    let request: JsonRpcRequest<CancelBundleParams> = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => return IngressError::InvalidPayload(err.to_string()).into_response(),
    };

    if request.method != ETH_CANCEL_BUNDLE_METHOD {
        return IngressError::InvalidMethod(request.method).into_response();
    }
    if request.params.is_empty() {
        return IngressError::MissingParams.into_response();
    }

    let mut failed_bundles: Vec<String> = Vec::new();
    for params in &request.params {
        if params.replacement_uuid.is_empty() {
            failed_bundles.push("missing UUID".to_string());
            continue;
        }
        if let Err(err) = state.pool.mark_for_deletion(&params.replacement_uuid) {
            tracing::error!(
                uuid = %params.replacement_uuid,
                error = %err,
                "failed to cancel bundle"
            );
            failed_bundles.push(params.replacement_uuid.clone());
        }
    }

    if failed_bundles.is_empty() {
        (
            StatusCode::OK,
            Json(json!({
                "jsonrpc": "2.0",
                "id": request.id,
                "result": "All bundles canceled successfully",
            })),
        )
            .into_response()
    } else {
        (
            StatusCode::MULTI_STATUS,
            Json(json!({
                "jsonrpc": "2.0",
                "id": request.id,
                "error": {
                    "message": "Failed to cancel some bundles",
                    "failedBundles": failed_bundles,
                },
            })),
        )
            .into_response()
    }
}
