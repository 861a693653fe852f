//! In-memory [`ContentStore`] mock: same eviction and distance-index
//! semantics as [`crate::sled_store::SledStore`], minus durability. Grounded
//! on this crate's memory-backed engine, which keeps data in process memory
//! behind the same trait its durable sibling implements.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ethereum_types::U256;
use parking_lot::RwLock;

use crate::{
    ContentId, ContentStore, DistanceEntry, EvictionOutcome, EvictionTiebreak, PutOutcome,
    StoreConfig, StoreError, StoreResult,
};

struct Entry {
    blob: Vec<u8>,
    seq: u64,
}

struct Inner {
    content: BTreeMap<ContentId, Entry>,
    /// distance_be || tiebreak_be || content_id -> content_id, mirroring the
    /// durable backend's secondary index key shape so both backends order
    /// eviction identically.
    index: BTreeMap<Vec<u8>, ContentId>,
    /// Maintained incrementally alongside `content` rather than refolded on
    /// every `put`, since `put` reads it on every call to decide eviction.
    used_bytes: u64,
}

pub struct MemoryStore {
    config: StoreConfig,
    capacity_bytes: AtomicU64,
    next_seq: AtomicU64,
    closed: AtomicBool,
    lock: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        let capacity_bytes = config.capacity_bytes;
        tracing::info!(capacity_bytes, "opened in-memory content store");
        Self {
            config,
            capacity_bytes: AtomicU64::new(capacity_bytes),
            next_seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            lock: RwLock::new(Inner {
                content: BTreeMap::new(),
                index: BTreeMap::new(),
                used_bytes: 0,
            }),
        }
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn tiebreak_component(&self, seq: u64, content_id: &ContentId) -> [u8; 8] {
        match self.config.eviction_tiebreak {
            EvictionTiebreak::InsertionOrder => (u64::MAX - seq).to_be_bytes(),
            EvictionTiebreak::ContentId => content_id[0..8].try_into().unwrap(),
        }
    }

    fn index_key(&self, content_id: &ContentId, seq: u64) -> Vec<u8> {
        let distance = portal_distance::distance(&self.config.node_id, content_id);
        let distance_be = distance.to_big_endian();
        let mut key = Vec::with_capacity(32 + 8 + 32);
        key.extend_from_slice(&distance_be);
        key.extend_from_slice(&self.tiebreak_component(seq, content_id));
        key.extend_from_slice(content_id);
        key
    }

    fn used_size_unlocked(inner: &Inner) -> u64 {
        inner.used_bytes
    }

    fn remove_unlocked(&self, inner: &mut Inner, content_id: &ContentId) {
        if let Some(entry) = inner.content.remove(content_id) {
            let idx_key = self.index_key(content_id, entry.seq);
            inner.index.remove(&idx_key);
            inner.used_bytes = inner.used_bytes.saturating_sub(entry.blob.len() as u64);
        }
    }

    fn largest_distance_unlocked(inner: &Inner) -> Option<U256> {
        inner.index.keys().next_back().map(|k| U256::from_big_endian(&k[0..32]))
    }

    /// Removes entries farther than `radius`, one at a time, farthest first.
    /// Caller holds the write lock.
    fn force_prune_unlocked(&self, inner: &mut Inner, radius: U256) -> u32 {
        let mut removed = 0u32;
        loop {
            let Some(farthest_id) = inner.index.iter().next_back().map(|(_, id)| *id) else {
                break;
            };
            let distance = portal_distance::distance(&self.config.node_id, &farthest_id);
            if distance <= radius {
                break;
            }
            self.remove_unlocked(inner, &farthest_id);
            removed += 1;
        }
        removed
    }

    /// Evicts farthest-first until `used_size <= capacity`, invoking
    /// `on_evict` for each removed id. Caller holds the write lock. Shared
    /// by `put`'s byte-budget pass and `set_capacity_bytes`'s fallback pass.
    fn evict_until_under_capacity_unlocked(
        &self,
        inner: &mut Inner,
        capacity: u64,
        mut on_evict: impl FnMut(ContentId),
    ) {
        while Self::used_size_unlocked(inner) > capacity {
            let Some(farthest_id) = inner.index.iter().next_back().map(|(_, id)| *id) else {
                break;
            };
            self.remove_unlocked(inner, &farthest_id);
            on_evict(farthest_id);
        }
    }
}

impl ContentStore for MemoryStore {
    fn get(&self, content_id: &ContentId) -> StoreResult<Vec<u8>> {
        self.ensure_open()?;
        let inner = self.lock.read();
        inner
            .content
            .get(content_id)
            .map(|e| e.blob.clone())
            .ok_or(StoreError::NotFound(*content_id))
    }

    fn put(&self, content_id: ContentId, blob: &[u8]) -> StoreResult<PutOutcome> {
        self.ensure_open()?;
        let mut inner = self.lock.write();

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        if let Some(prev) = inner.content.remove(&content_id) {
            let prev_key = self.index_key(&content_id, prev.seq);
            inner.index.remove(&prev_key);
            inner.used_bytes = inner.used_bytes.saturating_sub(prev.blob.len() as u64);
        }
        let new_key = self.index_key(&content_id, seq);
        inner.index.insert(new_key, content_id);
        inner.used_bytes = inner.used_bytes.saturating_add(blob.len() as u64);
        inner.content.insert(
            content_id,
            Entry {
                blob: blob.to_vec(),
                seq,
            },
        );

        let capacity = self.capacity_bytes.load(Ordering::SeqCst);
        let mut outcome = EvictionOutcome::none();
        self.evict_until_under_capacity_unlocked(&mut inner, capacity, |evicted_id| {
            if evicted_id == content_id {
                outcome.pruned = true;
            } else {
                outcome.pruned_count = outcome.pruned_count.saturating_add(1);
            }
        });
        tracing::debug!(
            pruned = outcome.pruned,
            pruned_count = outcome.pruned_count,
            "eviction pass complete"
        );
        Ok(outcome.into())
    }

    fn delete(&self, content_id: &ContentId) -> StoreResult<()> {
        self.ensure_open()?;
        let mut inner = self.lock.write();
        self.remove_unlocked(&mut inner, content_id);
        Ok(())
    }

    fn size(&self) -> StoreResult<u64> {
        self.used_size()
    }

    fn used_size(&self) -> StoreResult<u64> {
        self.ensure_open()?;
        let inner = self.lock.read();
        Ok(Self::used_size_unlocked(&inner))
    }

    fn content_count(&self) -> StoreResult<u64> {
        self.ensure_open()?;
        let inner = self.lock.read();
        Ok(inner.content.len() as u64)
    }

    fn largest_distance(&self) -> StoreResult<Option<U256>> {
        self.ensure_open()?;
        let inner = self.lock.read();
        Ok(Self::largest_distance_unlocked(&inner))
    }

    fn iter_by_distance_desc(
        &self,
    ) -> StoreResult<Box<dyn Iterator<Item = StoreResult<DistanceEntry>> + '_>> {
        self.ensure_open()?;
        let inner = self.lock.read();
        let entries: Vec<DistanceEntry> = inner
            .index
            .iter()
            .rev()
            .map(|(key, content_id)| DistanceEntry {
                content_id: *content_id,
                byte_len: inner.content.get(content_id).map(|e| e.blob.len() as u64).unwrap_or(0),
                distance: U256::from_big_endian(&key[0..32]),
            })
            .collect();
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn reclaim_space(&self) -> StoreResult<()> {
        self.ensure_open()?;
        Ok(())
    }

    fn force_prune(&self, radius: U256) -> StoreResult<u32> {
        self.ensure_open()?;
        let mut inner = self.lock.write();
        let removed = self.force_prune_unlocked(&mut inner, radius);
        tracing::info!(%radius, removed, "force prune complete");
        Ok(removed)
    }

    fn set_capacity_bytes(&self, new_capacity_bytes: u64) -> StoreResult<EvictionOutcome> {
        self.ensure_open()?;
        let mut inner = self.lock.write();
        self.capacity_bytes.store(new_capacity_bytes, Ordering::SeqCst);
        let used = Self::used_size_unlocked(&inner);
        let mut pruned_count = 0u32;

        if used > new_capacity_bytes {
            // C5: predict a radius that should bring used_size near the new
            // capacity under a uniform content-id distribution, and spend it
            // via force-prune before falling back to the raw byte-budget loop.
            if let Some(old_radius) = Self::largest_distance_unlocked(&inner) {
                let radius = portal_distance::estimate_new_radius(old_radius, used, new_capacity_bytes);
                pruned_count += self.force_prune_unlocked(&mut inner, radius);
            }
            // The estimate assumes a uniform distribution; real content ids
            // rarely are, so finish with the exact byte-budget loop to keep
            // the soft-capacity contract (I2) hard regardless.
            self.evict_until_under_capacity_unlocked(&mut inner, new_capacity_bytes, |_| {
                pruned_count = pruned_count.saturating_add(1);
            });
        }

        Ok(EvictionOutcome {
            pruned: false,
            pruned_count,
        })
    }

    fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // Nothing to page out for an in-memory backend; reclaim_space mirrors
        // the durable backend's contract and is a no-op here too, but the
        // flag is still observed rather than silently ignored.
        tracing::info!(vacuumed = self.config.vacuum_on_close, "closed in-memory content store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_equals_used_size_for_the_mock_backend() {
        let store = MemoryStore::new(StoreConfig::new([0u8; 32], 1024, "unused"));
        store.put([1u8; 32], b"abc").unwrap();
        assert_eq!(store.size().unwrap(), store.used_size().unwrap());
        assert_eq!(store.unused_size().unwrap(), 0);
    }

    #[test]
    fn delete_of_missing_key_is_a_no_op() {
        let store = MemoryStore::new(StoreConfig::new([0u8; 32], 1024, "unused"));
        store.delete(&[9u8; 32]).unwrap();
    }

    #[test]
    fn lowering_capacity_evicts_down_to_the_new_budget() {
        let store = MemoryStore::new(StoreConfig::new([0u8; 32], 100_000, "unused"));
        for i in 1..=10u8 {
            store.put([i; 32], &vec![0u8; 10_000]).unwrap();
        }
        assert_eq!(store.content_count().unwrap(), 10);

        let outcome = store.set_capacity_bytes(30_000).unwrap();
        assert!(outcome.pruned_count > 0);
        assert!(store.used_size().unwrap() <= 30_000);
        assert!(store.content_count().unwrap() <= 3);
    }

    #[test]
    fn vacuum_on_close_is_honored_without_breaking_idempotence() {
        let mut config = StoreConfig::new([0u8; 32], 1024, "unused");
        config.vacuum_on_close = true;
        let store = MemoryStore::new(config);
        store.put([1u8; 32], b"x").unwrap();
        store.close().unwrap();
        store.close().unwrap();
    }
}
