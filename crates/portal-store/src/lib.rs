#![forbid(unsafe_code)]

//! The local content store: a durable `content_id -> blob` mapping with a
//! distance-bounded soft capacity enforced synchronously on the write path,
//! plus an in-memory mock with identical contracts.

mod error;
mod eviction;
pub mod memory_store;
pub mod sled_store;

pub use error::{StoreError, StoreResult};
pub use eviction::EvictionOutcome;
pub use portal_distance::{ContentId, NodeId};

use ethereum_types::U256;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use memory_store::MemoryStore;
pub use sled_store::SledStore;

/// Outcome of a single `put`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOutcome {
    pub pruned: bool,
    pub pruned_count: u32,
}

impl From<EvictionOutcome> for PutOutcome {
    fn from(e: EvictionOutcome) -> Self {
        PutOutcome {
            pruned: e.pruned,
            pruned_count: e.pruned_count,
        }
    }
}

/// How ties between equidistant entries are broken during eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionTiebreak {
    /// Older entries (lower insertion sequence number) are evicted first.
    #[default]
    InsertionOrder,
    /// Entries with the lexicographically greater content-id are evicted first.
    ContentId,
}

/// Construction-time configuration for a durable store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub node_id: NodeId,
    pub capacity_bytes: u64,
    pub data_dir: PathBuf,
    #[serde(default)]
    pub eviction_tiebreak: EvictionTiebreak,
    #[serde(default)]
    pub vacuum_on_close: bool,
}

impl StoreConfig {
    pub fn new(node_id: NodeId, capacity_bytes: u64, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            node_id,
            capacity_bytes,
            data_dir: data_dir.into(),
            eviction_tiebreak: EvictionTiebreak::default(),
            vacuum_on_close: false,
        }
    }
}

/// One entry as surfaced by [`ContentStore::iter_by_distance_desc`].
#[derive(Debug, Clone)]
pub struct DistanceEntry {
    pub content_id: ContentId,
    pub byte_len: u64,
    pub distance: U256,
}

/// Contract shared by every backend: the durable sled-backed store and
/// the in-memory mock. Both enforce identical invariants; callers that only
/// depend on this trait cannot tell which backend they are talking to from
/// behavior alone.
pub trait ContentStore: Send + Sync {
    /// `Err(StoreError::NotFound)` when absent, `Err(StoreError::Closed)`
    /// after `close`.
    fn get(&self, content_id: &ContentId) -> StoreResult<Vec<u8>>;

    /// Synchronously enforces the soft capacity: may evict other
    /// entries, or even the entry just inserted, before returning.
    fn put(&self, content_id: ContentId, blob: &[u8]) -> StoreResult<PutOutcome>;

    fn delete(&self, content_id: &ContentId) -> StoreResult<()>;

    /// Total bytes provisioned on disk, including free pages.
    fn size(&self) -> StoreResult<u64>;

    /// Bytes actually occupied by live entries.
    fn used_size(&self) -> StoreResult<u64>;

    /// `size - used_size`.
    fn unused_size(&self) -> StoreResult<u64> {
        let size = self.size()?;
        let used = self.used_size()?;
        Ok(size.saturating_sub(used))
    }

    fn content_count(&self) -> StoreResult<u64>;

    /// Distance of the farthest stored entry from this store's node id, or
    /// `None` if the store holds nothing.
    fn largest_distance(&self) -> StoreResult<Option<U256>>;

    /// Lazy, finite, not restartable after a mutation. Farthest entry
    /// first.
    fn iter_by_distance_desc(
        &self,
    ) -> StoreResult<Box<dyn Iterator<Item = StoreResult<DistanceEntry>> + '_>>;

    /// Releases free pages back to the filesystem (vacuum).
    fn reclaim_space(&self) -> StoreResult<()>;

    /// `ForcePrune(R)`: removes every entry whose distance exceeds `radius`
    /// in one transaction. Returns the number of entries removed.
    fn force_prune(&self, radius: U256) -> StoreResult<u32>;

    /// Lowers (or raises) the soft capacity, eagerly evicting if the new
    /// capacity is below `used_size`.
    fn set_capacity_bytes(&self, new_capacity_bytes: u64) -> StoreResult<EvictionOutcome>;

    /// Idempotent; a second call returns `Ok(())`.
    fn close(&self) -> StoreResult<()>;
}
