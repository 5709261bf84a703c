//! In-memory bundle pool for the sequencer.
//!
//! This crate provides a thread-safe, ordered store of transaction bundles
//! keyed by their replacement UUID, shared between the HTTP ingress handlers,
//! the downstream dispatcher and the periodic cleanup job.
//!
//! # Features
//!
//! - Replacement semantics: a live UUID can only be re-used with an explicit
//!   replace, a soft-deleted one is silently evicted on re-insert
//! - Soft-delete ("mark for deletion") with periodic compaction
//! - Ordered dispatch snapshots under a configurable sort policy
//! - Thread-safe via an internal lock covering both pool views
//!
//! # Usage
//!
//! ```ignore
//! use sequencer_pool::{new_shared_pool, SortPolicy};
//!
//! let pool = new_shared_pool(SortPolicy::BlockNumber);
//!
//! // Ingress side
//! pool.add(bundle, false)?;
//!
//! // Dispatcher side
//! let batch = pool.snapshot_for_dispatch(100, false);
//! for acked in acked_uuids {
//!     let _ = pool.mark_for_deletion(&acked);
//! }
//!
//! // Cleanup side
//! pool.compact();
//! ```

mod bundle;
mod error;
mod maintain;
mod pool;
mod sort;

pub use bundle::Bundle;
pub use error::{PoolError, PoolResult};
pub use maintain::run_cleanup_job;
pub use pool::{new_shared_pool, BundlePool, SharedBundlePool};
pub use sort::SortPolicy;
