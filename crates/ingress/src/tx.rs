//! Raw transaction decoding and the admission predicate.

use alloy_consensus::{Transaction, TxEnvelope};
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{hex, B256};
use thiserror::Error;

/// Minimum gas a transaction must carry to be admitted (a bare transfer).
pub const MIN_TX_GAS: u64 = 21_000;

/// Failures turning a wire string into a transaction envelope.
#[derive(Debug, Error)]
pub enum TxDecodeError {
    /// The string was not valid hex.
    #[error("invalid transaction hex: {0}")]
    Hex(String),

    /// The bytes were not a valid EIP-2718 transaction.
    #[error("invalid transaction encoding: {0}")]
    Decode(String),
}

/// Decode a hex-encoded signed transaction, with or without a `0x` prefix.
pub fn decode_raw_transaction(raw: &str) -> Result<TxEnvelope, TxDecodeError> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    let data = hex::decode(stripped).map_err(|e| TxDecodeError::Hex(e.to_string()))?;
    let mut slice = data.as_slice();
    TxEnvelope::decode_2718(&mut slice).map_err(|e| TxDecodeError::Decode(e.to_string()))
}

/// Cheap admission filter over a decoded transaction.
///
/// True iff the hash is non-zero and the gas limit covers at least a plain
/// transfer. This is not a consensus check; signature recovery is left to
/// the downstream builder.
pub fn is_valid_transaction(tx: &TxEnvelope) -> bool {
    if tx.gas_limit() < MIN_TX_GAS {
        tracing::warn!(gas = tx.gas_limit(), "transaction has insufficient gas");
        return false;
    }
    tx.tx_hash() != &B256::ZERO
}
