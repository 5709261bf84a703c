//! HTTP ingress for the sequencer.
//!
//! Serves the searcher-facing JSON-RPC surface under `/sequencer`:
//!
//! - `POST /sequencer/eth_sendBundle` — admit bundles into the pool
//! - `POST /sequencer/eth_cancelBundle` — soft-delete bundles by UUID
//! - `POST /sequencer/login` — issue a bearer token
//! - `GET /sequencer/health` — liveness
//!
//! Bundle endpoints sit behind bearer-token auth (role `user`) and every
//! route under the prefix is rate limited. `/metrics` is served at the root
//! when metrics are enabled.
//!
//! The JSON-RPC envelope is parsed by hand rather than through a framework
//! router because the API's replies are carried in HTTP status codes
//! (202 accepted, 207 partial cancel failure, 400 framing, 500 body read)
//! that do not fit standard JSON-RPC batch semantics.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod health;
pub mod jsonrpc;
pub mod rate_limit;
pub mod server;
pub mod tx;

pub use error::IngressError;
pub use jsonrpc::{CancelBundleParams, JsonRpcRequest, SendBundleParams, SendBundleResponse};
pub use server::{router, serve, AppState};
