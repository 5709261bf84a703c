//! Downstream dispatch for the sequencer.
//!
//! A single long-lived task periodically drains an ordered batch from the
//! bundle pool and forwards it to the bundle-merger service over gRPC. The
//! delivery contract is at-least-once downstream: a bundle leaves the pool
//! only when the merger acknowledges it with `success = true`; transport
//! errors and rejections leave the pool untouched so the bundle is retried
//! on the next tick.

pub mod client;
pub mod error;

/// Generated protobuf code from tonic-build.
#[allow(clippy::all)]
pub mod proto {
    tonic::include_proto!("bundlemerger.v1");
}

pub use client::{connect_with_backoff, BackoffConfig, Dispatcher, DispatcherConfig};
pub use error::DispatchError;
