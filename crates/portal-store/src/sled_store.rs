//! Durable [`ContentStore`] backend (/), built on `sled`. Grounded
//! on the sled-backed engine this crate's local-store trait is modeled on:
//! one `Db`, one `Tree` per logical keyspace, a `parking_lot::RwLock` guarding
//! the explicit shared/exclusive access pattern requires on top of sled's
//! own internal concurrency.
//!
//! Two trees back every store: `content` (`content_id -> seq || blob`) and
//! `by_distance` (`distance_be || tiebreak_be || content_id -> ()`), the
//! latter an index only -- it is never consulted for anything but ordering
//! and could be rebuilt from `content` if it were ever found missing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ethereum_types::U256;
use parking_lot::RwLock;
use sled::transaction::{ConflictableTransactionError, Transactional};

use crate::{
    eviction, ContentId, ContentStore, DistanceEntry, EvictionOutcome, EvictionTiebreak,
    PutOutcome, StoreConfig, StoreError, StoreResult,
};

const CONTENT_TREE: &str = "content";
const INDEX_TREE: &str = "by_distance";
const META_TREE: &str = "meta";
const NEXT_SEQ_KEY: &str = "next_seq";

pub struct SledStore {
    config: StoreConfig,
    capacity_bytes: AtomicU64,
    db: sled::Db,
    content: sled::Tree,
    index: sled::Tree,
    meta: sled::Tree,
    next_seq: AtomicU64,
    /// Maintained incrementally by `put`/`remove_content_id` rather than
    /// rescanned, since `put` checks it on every call.
    used_bytes: AtomicU64,
    closed: AtomicBool,
    lock: RwLock<()>,
}

impl SledStore {
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let db = sled::open(&config.data_dir)?;
        let content = db.open_tree(CONTENT_TREE)?;
        let index = db.open_tree(INDEX_TREE)?;
        let meta = db.open_tree(META_TREE)?;
        let next_seq = match meta.get(NEXT_SEQ_KEY)? {
            Some(bytes) => u64::from_le_bytes(bytes.as_ref().try_into().map_err(|_| {
                StoreError::backend("corrupt next_seq record in meta tree")
            })?),
            None => 0,
        };
        let capacity_bytes = config.capacity_bytes;
        let used_bytes = Self::scan_used_size(&content)?;
        tracing::info!(data_dir = %config.data_dir.display(), capacity_bytes, "opened sled content store");
        Ok(Self {
            config,
            capacity_bytes: AtomicU64::new(capacity_bytes),
            db,
            content,
            index,
            meta,
            next_seq: AtomicU64::new(next_seq),
            used_bytes: AtomicU64::new(used_bytes),
            closed: AtomicBool::new(false),
            lock: RwLock::new(()),
        })
    }

    /// Full-tree scan, only ever run once at open time to seed `used_bytes`.
    fn scan_used_size(content: &sled::Tree) -> StoreResult<u64> {
        let mut total = 0u64;
        for item in content.iter() {
            let (_key, value) = item?;
            total = total.saturating_add(value.len().saturating_sub(8) as u64);
        }
        Ok(total)
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

    fn decode_record(record: &[u8]) -> StoreResult<(u64, &[u8])> {
        if record.len() < 8 {
            return Err(StoreError::backend("content record shorter than sequence header"));
        }
        let seq = u64::from_le_bytes(record[0..8].try_into().unwrap());
        Ok((seq, &record[8..]))
    }

    fn encode_record(seq: u64, blob: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + blob.len());
        out.extend_from_slice(&seq.to_le_bytes());
        out.extend_from_slice(blob);
        out
    }

    /// Farthest entry still present, without removing it.
    fn peek_farthest(&self) -> StoreResult<Option<(ContentId, u64)>> {
        match self.index.last()? {
            None => Ok(None),
            Some((key, _)) => {
                let content_id = extract_content_id(&key);
                let byte_len = match self.content.get(content_id)? {
                    Some(record) => Self::decode_record(&record)?.1.len() as u64,
                    None => 0,
                };
                Ok(Some((content_id, byte_len)))
            }
        }
    }

    /// Removes a content id from both trees atomically. A no-op if absent.
    fn remove_content_id(&self, content_id: &ContentId) -> StoreResult<()> {
        let Some(record) = self.content.get(content_id)? else {
            return Ok(());
        };
        let (seq, blob) = Self::decode_record(&record)?;
        let byte_len = blob.len() as u64;
        let idx_key = self.index_key(content_id, seq);
        (&self.content, &self.index)
            .transaction(|(content_tx, index_tx)| {
                content_tx.remove(content_id.as_slice())?;
                index_tx.remove(idx_key.clone())?;
                Ok::<(), ConflictableTransactionError<StoreError>>(())
            })
            .map_err(StoreError::from)?;
        self.used_bytes.fetch_sub(byte_len, Ordering::SeqCst);
        Ok(())
    }

    fn used_size_unlocked(&self) -> StoreResult<u64> {
        Ok(self.used_bytes.load(Ordering::SeqCst))
    }

    fn largest_distance_unlocked(&self) -> StoreResult<Option<U256>> {
        match self.index.last()? {
            None => Ok(None),
            Some((key, _)) => Ok(Some(U256::from_big_endian(&key[0..32]))),
        }
    }

    /// Removes entries farther than `radius`, one at a time, farthest first.
    /// Caller holds the write lock.
    fn force_prune_unlocked(&self, radius: U256) -> StoreResult<u32> {
        let mut removed = 0u32;
        loop {
            let Some((farthest_id, _)) = self.peek_farthest()? else {
                break;
            };
            let distance = portal_distance::distance(&self.config.node_id, &farthest_id);
            if distance <= radius {
                break;
            }
            self.remove_content_id(&farthest_id)?;
            removed += 1;
        }
        tracing::info!(%radius, removed, "force prune complete");
        Ok(removed)
    }

    /// sled compacts its own log segments in the background; flushing is the
    /// closest analogue to an explicit vacuum this backend exposes. Caller
    /// holds the write lock.
    fn reclaim_space_unlocked(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl ContentStore for SledStore {
    fn get(&self, content_id: &ContentId) -> StoreResult<Vec<u8>> {
        self.ensure_open()?;
        let _guard = self.lock.read();
        match self.content.get(content_id)? {
            Some(record) => Ok(Self::decode_record(&record)?.1.to_vec()),
            None => Err(StoreError::NotFound(*content_id)),
        }
    }

    fn put(&self, content_id: ContentId, blob: &[u8]) -> StoreResult<PutOutcome> {
        self.ensure_open()?;
        let _guard = self.lock.write();

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let previous = self.content.get(content_id)?;
        let prev_byte_len = match &previous {
            Some(prev) => Self::decode_record(prev)?.1.len() as u64,
            None => 0,
        };
        let record = Self::encode_record(seq, blob);
        let new_idx_key = self.index_key(&content_id, seq);

        (&self.content, &self.index, &self.meta)
            .transaction(|(content_tx, index_tx, meta_tx)| {
                if let Some(prev) = &previous {
                    let (prev_seq, _) =
                        Self::decode_record(prev).map_err(ConflictableTransactionError::Abort)?;
                    let prev_idx_key = self.index_key(&content_id, prev_seq);
                    index_tx.remove(prev_idx_key)?;
                }
                content_tx.insert(content_id.as_slice(), record.clone())?;
                index_tx.insert(new_idx_key.clone(), &b""[..])?;
                meta_tx.insert(NEXT_SEQ_KEY.as_bytes(), &(seq + 1).to_le_bytes()[..])?;
                Ok::<(), ConflictableTransactionError<StoreError>>(())
            })
            .map_err(StoreError::from)?;
        self.used_bytes
            .fetch_add(blob.len() as u64, Ordering::SeqCst);
        if prev_byte_len > 0 {
            self.used_bytes.fetch_sub(prev_byte_len, Ordering::SeqCst);
        }

        let used = self.used_size_unlocked()?;
        let capacity = self.capacity_bytes.load(Ordering::SeqCst);
        let outcome = if used > capacity {
            eviction::evict_until_under_capacity(
                capacity,
                used,
                content_id,
                || self.peek_farthest(),
                |id| self.remove_content_id(&id),
            )?
        } else {
            EvictionOutcome::none()
        };
        Ok(outcome.into())
    }

    fn delete(&self, content_id: &ContentId) -> StoreResult<()> {
        self.ensure_open()?;
        let _guard = self.lock.write();
        self.remove_content_id(content_id)
    }

    fn size(&self) -> StoreResult<u64> {
        self.ensure_open()?;
        let _guard = self.lock.read();
        Ok(self.db.size_on_disk()?)
    }

    fn used_size(&self) -> StoreResult<u64> {
        self.ensure_open()?;
        let _guard = self.lock.read();
        self.used_size_unlocked()
    }

    fn content_count(&self) -> StoreResult<u64> {
        self.ensure_open()?;
        let _guard = self.lock.read();
        Ok(self.content.len() as u64)
    }

    fn largest_distance(&self) -> StoreResult<Option<U256>> {
        self.ensure_open()?;
        let _guard = self.lock.read();
        self.largest_distance_unlocked()
    }

    fn iter_by_distance_desc(
        &self,
    ) -> StoreResult<Box<dyn Iterator<Item = StoreResult<DistanceEntry>> + '_>> {
        self.ensure_open()?;
        // Held for the iterator's entire lifetime so a concurrent put/delete/
        // force_prune cannot run while this (lazy) traversal is in progress.
        let guard = self.lock.read();
        let content = self.content.clone();
        let iter = self.index.iter().rev().map(move |entry| {
            let _guard = &guard;
            let (key, _) = entry.map_err(StoreError::from)?;
            let content_id = extract_content_id(&key);
            let distance = U256::from_big_endian(&key[0..32]);
            let byte_len = match content.get(content_id).map_err(StoreError::from)? {
                Some(record) => SledStore::decode_record(&record)?.1.len() as u64,
                None => 0,
            };
            Ok(DistanceEntry {
                content_id,
                byte_len,
                distance,
            })
        });
        Ok(Box::new(iter))
    }

    fn reclaim_space(&self) -> StoreResult<()> {
        self.ensure_open()?;
        let _guard = self.lock.write();
        self.reclaim_space_unlocked()
    }

    fn force_prune(&self, radius: U256) -> StoreResult<u32> {
        self.ensure_open()?;
        let _guard = self.lock.write();
        self.force_prune_unlocked(radius)
    }

    fn set_capacity_bytes(&self, new_capacity_bytes: u64) -> StoreResult<EvictionOutcome> {
        self.ensure_open()?;
        let _guard = self.lock.write();
        self.capacity_bytes.store(new_capacity_bytes, Ordering::SeqCst);
        let mut used = self.used_size_unlocked()?;
        let mut pruned_count = 0u32;

        if used > new_capacity_bytes {
            // C5: predict a radius that should bring used_size near the new
            // capacity under a uniform content-id distribution, and spend it
            // via force-prune before falling back to the raw byte-budget loop.
            if let Some(old_radius) = self.largest_distance_unlocked()? {
                let radius = portal_distance::estimate_new_radius(old_radius, used, new_capacity_bytes);
                pruned_count += self.force_prune_unlocked(radius)?;
                used = self.used_size_unlocked()?;
            }
            // The estimate assumes a uniform distribution; real content ids
            // rarely are, so finish with the exact byte-budget loop to keep
            // the soft-capacity contract (I2) hard regardless.
            pruned_count += eviction::evict_to_capacity(
                new_capacity_bytes,
                used,
                || self.peek_farthest(),
                |id| self.remove_content_id(&id),
            )?;
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
        let _guard = self.lock.write();
        if self.config.vacuum_on_close {
            self.reclaim_space_unlocked()?;
        } else {
            self.db.flush()?;
        }
        tracing::info!(vacuumed = self.config.vacuum_on_close, "closed sled content store");
        Ok(())
    }
}

fn extract_content_id(key: &[u8]) -> ContentId {
    let mut out = [0u8; 32];
    out.copy_from_slice(&key[key.len() - 32..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn overwriting_a_key_updates_the_index_without_duplication() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(StoreConfig::new([0u8; 32], 1024 * 1024, dir.path())).unwrap();
        let id = [5u8; 32];
        store.put(id, b"first").unwrap();
        store.put(id, b"second").unwrap();
        assert_eq!(store.get(&id).unwrap(), b"second");
        assert_eq!(store.content_count().unwrap(), 1);
        let entries: Vec<_> = store.iter_by_distance_desc().unwrap().collect::<StoreResult<_>>().unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn farthest_entry_is_evicted_before_nearer_ones() {
        // XOR distance is injective per node id, so distinct content ids from
        // a fixed node never truly tie; this exercises the ordinary ordering
        // path the tiebreak component only ever backstops.
        let dir = tempdir().unwrap();
        let node_id = [0u8; 32];
        let config = StoreConfig::new(node_id, 10, dir.path());
        let store = SledStore::open(config).unwrap();

        let near = {
            let mut id = [0u8; 32];
            id[31] = 1;
            id
        };
        let far = {
            let mut id = [0u8; 32];
            id[31] = 2;
            id
        };
        store.put(far, b"123456").unwrap();
        store.put(near, b"123456").unwrap();
        assert!(matches!(store.get(&far), Err(StoreError::NotFound(_))));
        assert_eq!(store.get(&near).unwrap(), b"123456");
    }

    #[test]
    fn lowering_capacity_evicts_down_to_the_new_budget() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(StoreConfig::new([0u8; 32], 100_000, dir.path())).unwrap();
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
        let dir = tempdir().unwrap();
        let mut config = StoreConfig::new([0u8; 32], 1024 * 1024, dir.path());
        config.vacuum_on_close = true;
        let store = SledStore::open(config).unwrap();
        store.put([1u8; 32], b"x").unwrap();
        store.close().unwrap();
        // idempotent even with vacuum_on_close set
        store.close().unwrap();
    }
}
