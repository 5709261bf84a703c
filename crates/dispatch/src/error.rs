//! Dispatch error types.

use thiserror::Error;

/// Failures on the path to the bundle merger.
///
/// All of these are transient from the pool's perspective: no variant ever
/// causes a bundle to be dropped.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The configured endpoint could not be parsed into a URI.
    #[error("invalid merger endpoint: {0}")]
    InvalidEndpoint(String),

    /// TLS could not be configured for the channel.
    #[error("tls configuration failed: {0}")]
    Tls(String),

    /// Dialing the merger failed.
    #[error("connection failed: {0}")]
    Connect(#[from] tonic::transport::Error),
}
