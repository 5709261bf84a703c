//! The concurrent bundle pool.
//!
//! Two views over the same set of bundles are kept in lockstep: a map from
//! replacement UUID to entry, and a sequence of UUIDs held in sort order.
//! A single lock covers both, so readers always observe a consistent
//! snapshot and writers are serialized. No `.await` ever happens under the
//! lock; every operation is bounded.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bundle::Bundle;
use crate::error::{PoolError, PoolResult};
use crate::sort::SortPolicy;

/// A pool entry: the shared bundle plus its soft-delete flag.
///
/// The flag lives here, not on [`Bundle`], so snapshot handles handed to the
/// dispatcher can never observe or race it.
struct PoolEntry {
    bundle: Arc<Bundle>,
    marked_for_deletion: bool,
}

#[derive(Default)]
struct PoolInner {
    /// Bundles by replacement UUID.
    by_uuid: HashMap<String, PoolEntry>,
    /// UUIDs in sort order. Invariant: same key set as `by_uuid`.
    sequence: Vec<String>,
}

/// Thread-safe pool of transaction bundles keyed by replacement UUID.
///
/// Shared between the ingress handlers (insert, cancel), the dispatcher
/// (snapshot, ack-driven marking) and the cleanup job (compaction). The sort
/// policy is fixed for the pool's lifetime.
pub struct BundlePool {
    inner: RwLock<PoolInner>,
    policy: SortPolicy,
}

impl BundlePool {
    /// Create an empty pool ordered by `policy`.
    pub fn new(policy: SortPolicy) -> Self {
        Self {
            inner: RwLock::new(PoolInner::default()),
            policy,
        }
    }

    /// Add a bundle to the pool.
    ///
    /// If a bundle with the same UUID is already present and soft-deleted it
    /// is silently evicted first. If it is live, the call fails with
    /// [`PoolError::Duplicate`] unless `replace` is set, in which case the
    /// old bundle is evicted and the new one takes its place. The sequence
    /// is re-sorted after every insertion; the sort is stable, so equal keys
    /// keep insertion order.
    pub fn add(&self, bundle: Bundle, replace: bool) -> PoolResult<()> {
        let mut inner = self.inner.write();
        let uuid = bundle.replacement_uuid.clone();

        match inner.by_uuid.get(&uuid).map(|e| e.marked_for_deletion) {
            Some(true) => {
                tracing::info!(
                    uuid = %uuid,
                    "existing bundle marked for deletion, replacing with new bundle"
                );
                evict(&mut inner, &uuid);
            }
            Some(false) if !replace => return Err(PoolError::Duplicate(uuid)),
            Some(false) => {
                tracing::info!(uuid = %uuid, "replacing existing bundle");
                evict(&mut inner, &uuid);
            }
            None => {}
        }

        inner.sequence.push(uuid.clone());
        inner.by_uuid.insert(
            uuid,
            PoolEntry {
                bundle: Arc::new(bundle),
                marked_for_deletion: false,
            },
        );
        sort_sequence(&mut inner, self.policy);

        Ok(())
    }

    /// Soft-delete the bundle with the given UUID.
    ///
    /// The bundle stays physically present until [`Self::compact`] runs, but
    /// is no longer visible to dispatch snapshots or the duplicate check.
    /// Re-marking an already marked bundle is a no-op success; an unknown
    /// UUID fails with [`PoolError::NotFound`].
    pub fn mark_for_deletion(&self, uuid: &str) -> PoolResult<()> {
        let mut inner = self.inner.write();
        match inner.by_uuid.get_mut(uuid) {
            Some(entry) => {
                entry.marked_for_deletion = true;
                tracing::info!(uuid, "bundle marked for deletion");
                Ok(())
            }
            None => Err(PoolError::NotFound(uuid.to_string())),
        }
    }

    /// Soft-delete a batch of bundles in one lock acquisition.
    ///
    /// UUIDs not present in the pool are skipped.
    pub fn mark_many<I, S>(&self, uuids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut inner = self.inner.write();
        for uuid in uuids {
            if let Some(entry) = inner.by_uuid.get_mut(uuid.as_ref()) {
                entry.marked_for_deletion = true;
            }
        }
    }

    /// Return up to `limit` live bundles in the pool's sort order.
    ///
    /// With `also_mark` the selected bundles are atomically soft-deleted so
    /// subsequent snapshots skip them; use this when the downstream
    /// transport takes ownership without a per-bundle ack. Without it the
    /// bundles remain live and will be returned again until acked, canceled
    /// or replaced.
    pub fn snapshot_for_dispatch(&self, limit: usize, also_mark: bool) -> Vec<Arc<Bundle>> {
        if limit == 0 {
            return Vec::new();
        }

        if !also_mark {
            let inner = self.inner.read();
            let mut selected = Vec::new();
            for uuid in &inner.sequence {
                let entry = &inner.by_uuid[uuid];
                if entry.marked_for_deletion {
                    continue;
                }
                selected.push(Arc::clone(&entry.bundle));
                if selected.len() >= limit {
                    break;
                }
            }
            return selected;
        }

        let mut inner = self.inner.write();
        let PoolInner { by_uuid, sequence } = &mut *inner;
        let mut selected = Vec::new();
        for uuid in sequence.iter() {
            if let Some(entry) = by_uuid.get_mut(uuid) {
                if entry.marked_for_deletion {
                    continue;
                }
                entry.marked_for_deletion = true;
                selected.push(Arc::clone(&entry.bundle));
                if selected.len() >= limit {
                    break;
                }
            }
        }
        selected
    }

    /// Physically remove every soft-deleted bundle from both views.
    ///
    /// The relative order of survivors is preserved.
    pub fn compact(&self) {
        let mut inner = self.inner.write();
        let PoolInner { by_uuid, sequence } = &mut *inner;
        sequence.retain(|uuid| {
            if by_uuid[uuid].marked_for_deletion {
                by_uuid.remove(uuid);
                false
            } else {
                true
            }
        });
    }

    /// Number of live (not soft-deleted) bundles.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .by_uuid
            .values()
            .filter(|e| !e.marked_for_deletion)
            .count()
    }

    /// Whether the pool holds no live bundles.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Remove `uuid` from both views. Caller holds the write lock.
fn evict(inner: &mut PoolInner, uuid: &str) {
    inner.by_uuid.remove(uuid);
    inner.sequence.retain(|u| u != uuid);
}

/// Re-sort the sequence view under `policy`. Caller holds the write lock.
fn sort_sequence(inner: &mut PoolInner, policy: SortPolicy) {
    let PoolInner { by_uuid, sequence } = inner;
    sequence.sort_by(|a, b| policy.compare(&by_uuid[a].bundle, &by_uuid[b].bundle));
}

/// Thread-safe shared handle to a [`BundlePool`].
pub type SharedBundlePool = Arc<BundlePool>;

/// Create a new shared pool ordered by `policy`.
pub fn new_shared_pool(policy: SortPolicy) -> SharedBundlePool {
    Arc::new(BundlePool::new(policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_consensus::{Signed, TxEip1559, TxEnvelope};
    use alloy_primitives::{PrimitiveSignature, B256, U256};

    fn test_tx(gas_limit: u64, hash_byte: u8) -> TxEnvelope {
        let tx = TxEip1559 {
            gas_limit,
            ..Default::default()
        };
        let signature = PrimitiveSignature::new(U256::from(1), U256::from(1), false);
        TxEnvelope::Eip1559(Signed::new_unchecked(
            tx,
            signature,
            B256::repeat_byte(hash_byte),
        ))
    }

    fn make_bundle(uuid: &str, block_number: &str) -> Bundle {
        Bundle {
            txs: vec![test_tx(30_000, 0x11)],
            block_number: block_number.to_string(),
            min_timestamp: 0,
            max_timestamp: 0,
            reverting_tx_hashes: vec![],
            replacement_uuid: uuid.to_string(),
            builders: vec![],
        }
    }

    fn snapshot_uuids(pool: &BundlePool, limit: usize) -> Vec<String> {
        pool.snapshot_for_dispatch(limit, false)
            .iter()
            .map(|b| b.replacement_uuid.clone())
            .collect()
    }

    #[test]
    fn test_add_and_len() {
        let pool = BundlePool::new(SortPolicy::BlockNumber);
        assert!(pool.is_empty());

        pool.add(make_bundle("u1", "0x10"), false).unwrap();
        pool.add(make_bundle("u2", "0x11"), false).unwrap();

        assert_eq!(pool.len(), 2);
        assert!(!pool.is_empty());
    }

    #[test]
    fn test_duplicate_rejected() {
        let pool = BundlePool::new(SortPolicy::BlockNumber);
        pool.add(make_bundle("u1", "0x10"), false).unwrap();

        let err = pool.add(make_bundle("u1", "0x20"), false).unwrap_err();
        assert_eq!(err, PoolError::Duplicate("u1".to_string()));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_replace_keeps_latest_contents() {
        let pool = BundlePool::new(SortPolicy::BlockNumber);
        pool.add(make_bundle("u1", "0x10"), true).unwrap();
        pool.add(make_bundle("u1", "0x99"), true).unwrap();

        assert_eq!(pool.len(), 1);
        let snapshot = pool.snapshot_for_dispatch(10, false);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].block_number, "0x99");
    }

    #[test]
    fn test_add_over_marked_entry_succeeds_without_replace() {
        // send -> cancel -> send with the same UUID: the third call wins.
        let pool = BundlePool::new(SortPolicy::BlockNumber);
        pool.add(make_bundle("u1", "0x10"), false).unwrap();
        pool.mark_for_deletion("u1").unwrap();

        pool.add(make_bundle("u1", "0x20"), false).unwrap();

        let snapshot = pool.snapshot_for_dispatch(10, false);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].block_number, "0x20");
    }

    #[test]
    fn test_mark_unknown_uuid_not_found() {
        let pool = BundlePool::new(SortPolicy::BlockNumber);
        let err = pool.mark_for_deletion("missing").unwrap_err();
        assert_eq!(err, PoolError::NotFound("missing".to_string()));
    }

    #[test]
    fn test_remark_is_noop_success() {
        let pool = BundlePool::new(SortPolicy::BlockNumber);
        pool.add(make_bundle("u1", "0x10"), false).unwrap();

        pool.mark_for_deletion("u1").unwrap();
        pool.mark_for_deletion("u1").unwrap();

        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn test_snapshot_skips_marked() {
        let pool = BundlePool::new(SortPolicy::BlockNumber);
        pool.add(make_bundle("u1", "0x10"), false).unwrap();
        pool.add(make_bundle("u2", "0x11"), false).unwrap();
        pool.mark_for_deletion("u1").unwrap();

        assert_eq!(snapshot_uuids(&pool, 10), vec!["u2"]);
    }

    #[test]
    fn test_snapshot_with_mark_prevents_resend() {
        let pool = BundlePool::new(SortPolicy::BlockNumber);
        pool.add(make_bundle("u1", "0x10"), false).unwrap();
        pool.add(make_bundle("u2", "0x11"), false).unwrap();

        let first = pool.snapshot_for_dispatch(10, true);
        assert_eq!(first.len(), 2);

        let second = pool.snapshot_for_dispatch(10, true);
        assert!(second.is_empty());
    }

    #[test]
    fn test_snapshot_respects_limit_and_order() {
        let pool = BundlePool::new(SortPolicy::BlockNumber);
        pool.add(make_bundle("u3", "0x30"), false).unwrap();
        pool.add(make_bundle("u1", "0x10"), false).unwrap();
        pool.add(make_bundle("u2", "0x20"), false).unwrap();

        assert_eq!(snapshot_uuids(&pool, 2), vec!["u1", "u2"]);
        assert!(pool.snapshot_for_dispatch(0, false).is_empty());
    }

    #[test]
    fn test_mark_many_skips_absent() {
        let pool = BundlePool::new(SortPolicy::BlockNumber);
        pool.add(make_bundle("u1", "0x10"), false).unwrap();
        pool.add(make_bundle("u2", "0x11"), false).unwrap();

        pool.mark_many(["u1", "nope"]);

        assert_eq!(snapshot_uuids(&pool, 10), vec!["u2"]);
    }

    #[test]
    fn test_block_number_order_mixed_radix() {
        let pool = BundlePool::new(SortPolicy::BlockNumber);
        pool.add(make_bundle("hex", "0x20"), false).unwrap(); // 32
        pool.add(make_bundle("dec", "20"), false).unwrap(); // 20
        pool.add(make_bundle("bad", "latest"), false).unwrap(); // parses as 0

        assert_eq!(snapshot_uuids(&pool, 10), vec!["bad", "dec", "hex"]);
    }

    #[test]
    fn test_min_timestamp_ascending() {
        let pool = BundlePool::new(SortPolicy::MinTimestamp);
        let mut early = make_bundle("early", "0x1");
        early.min_timestamp = 100;
        let mut late = make_bundle("late", "0x1");
        late.min_timestamp = 200;

        pool.add(late, false).unwrap();
        pool.add(early, false).unwrap();

        assert_eq!(snapshot_uuids(&pool, 10), vec!["early", "late"]);
    }

    #[test]
    fn test_max_timestamp_descending() {
        let pool = BundlePool::new(SortPolicy::MaxTimestamp);
        let mut low = make_bundle("low", "0x1");
        low.max_timestamp = 100;
        let mut high = make_bundle("high", "0x1");
        high.max_timestamp = 200;

        pool.add(low, false).unwrap();
        pool.add(high, false).unwrap();

        assert_eq!(snapshot_uuids(&pool, 10), vec!["high", "low"]);
    }

    #[test]
    fn test_builder_priority_descending() {
        let pool = BundlePool::new(SortPolicy::BuilderPriority);
        let mut fb = make_bundle("fb", "0x1");
        fb.builders = vec!["flashbots".to_string()];
        let mut titan = make_bundle("titan", "0x1");
        titan.builders = vec!["Titan".to_string()];
        let nobody = make_bundle("nobody", "0x1");

        pool.add(nobody, false).unwrap();
        pool.add(fb, false).unwrap();
        pool.add(titan, false).unwrap();

        assert_eq!(snapshot_uuids(&pool, 10), vec!["titan", "fb", "nobody"]);
    }

    #[test]
    fn test_equal_keys_keep_insertion_order() {
        let pool = BundlePool::new(SortPolicy::BlockNumber);
        pool.add(make_bundle("first", "0x10"), false).unwrap();
        pool.add(make_bundle("second", "0x10"), false).unwrap();
        pool.add(make_bundle("third", "0x10"), false).unwrap();

        assert_eq!(snapshot_uuids(&pool, 10), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_compact_preserves_order() {
        let pool = BundlePool::new(SortPolicy::BlockNumber);
        for (uuid, block) in [("u1", "0x10"), ("u2", "0x20"), ("u3", "0x30"), ("u4", "0x40")] {
            pool.add(make_bundle(uuid, block), false).unwrap();
        }
        pool.mark_for_deletion("u2").unwrap();

        pool.compact();

        assert_eq!(snapshot_uuids(&pool, 10), vec!["u1", "u3", "u4"]);
    }

    #[test]
    fn test_compact_removes_from_both_views() {
        let pool = BundlePool::new(SortPolicy::BlockNumber);
        pool.add(make_bundle("u1", "0x10"), false).unwrap();
        pool.mark_for_deletion("u1").unwrap();

        // Still physically present: re-marking is a no-op success.
        pool.mark_for_deletion("u1").unwrap();

        pool.compact();

        // Gone from the map: cancellation now reports not-found.
        let err = pool.mark_for_deletion("u1").unwrap_err();
        assert_eq!(err, PoolError::NotFound("u1".to_string()));
        assert!(pool.snapshot_for_dispatch(10, false).is_empty());
    }

    #[test]
    fn test_compact_on_empty_pool() {
        let pool = BundlePool::new(SortPolicy::BlockNumber);
        pool.compact();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_concurrent_add_same_uuid_exactly_one_wins() {
        let pool = new_shared_pool(SortPolicy::BlockNumber);
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    pool.add(make_bundle("contested", &format!("0x{i}")), false)
                        .is_ok()
                })
            })
            .collect();

        let successes = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_concurrent_snapshot_with_mark_no_double_send() {
        let pool = new_shared_pool(SortPolicy::BlockNumber);
        for i in 0..100 {
            pool.add(make_bundle(&format!("u{i}"), "0x10"), false)
                .unwrap();
        }

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    let mut seen = Vec::new();
                    loop {
                        let batch = pool.snapshot_for_dispatch(10, true);
                        if batch.is_empty() {
                            break;
                        }
                        seen.extend(batch.iter().map(|b| b.replacement_uuid.clone()));
                    }
                    seen
                })
            })
            .collect();

        let mut all: Vec<String> = threads
            .into_iter()
            .flat_map(|t| t.join().unwrap())
            .collect();
        all.sort();
        let before_dedup = all.len();
        all.dedup();

        // Every bundle handed out exactly once across all snapshots.
        assert_eq!(before_dedup, 100);
        assert_eq!(all.len(), 100);
    }
}
