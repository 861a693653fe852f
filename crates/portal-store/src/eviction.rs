use crate::{ContentId, StoreResult};

/// Result of a single eviction pass triggered by a `put`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionOutcome {
    /// True if the just-inserted entry itself ended up evicted (self-eviction,
    /// e.g. a blob larger than the remaining capacity after freeing everything
    /// else).
    pub pruned: bool,
    /// Number of entries removed *other than* the incoming one.
    pub pruned_count: u32,
}

impl EvictionOutcome {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn merge(self, other: EvictionOutcome) -> EvictionOutcome {
        EvictionOutcome {
            pruned: self.pruned || other.pruned,
            pruned_count: self.pruned_count.saturating_add(other.pruned_count),
        }
    }
}

/// Backend-agnostic eviction loop: while `used_bytes` exceeds `capacity_bytes`,
/// repeatedly ask `pop_farthest` for the entry with the greatest distance
/// still present and `remove` it, until the budget is satisfied or nothing is
/// left to evict.
///
/// `pop_farthest` and `remove` are injected so the same policy serves both the
/// durable (sled-backed) store and the in-memory mock without duplicating the
/// loop itself.
pub fn evict_until_under_capacity<F1, F2>(
    capacity_bytes: u64,
    mut used_bytes: u64,
    incoming_content_id: ContentId,
    mut pop_farthest: F1,
    mut remove: F2,
) -> StoreResult<EvictionOutcome>
where
    F1: FnMut() -> StoreResult<Option<(ContentId, u64)>>,
    F2: FnMut(ContentId) -> StoreResult<()>,
{
    let mut outcome = EvictionOutcome::none();
    while used_bytes > capacity_bytes {
        let Some((farthest_id, byte_len)) = pop_farthest()? else {
            // Nothing left to evict; capacity may still be exceeded by a
            // single oversized entry that has not yet been chosen for removal
            // by the caller -- that case is handled by the caller looping
            // again after inserting, so an empty store here just means done.
            break;
        };
        remove(farthest_id)?;
        used_bytes = used_bytes.saturating_sub(byte_len);
        if farthest_id == incoming_content_id {
            outcome.pruned = true;
        } else {
            outcome.pruned_count = outcome.pruned_count.saturating_add(1);
        }
    }
    tracing::debug!(
        pruned = outcome.pruned,
        pruned_count = outcome.pruned_count,
        "eviction pass complete"
    );
    Ok(outcome)
}

/// Drives entries out of the store until `used_bytes` is within budget, with
/// no notion of a "just-inserted" entry to flag specially. Used by
/// `force_prune` and by a capacity reduction via `set_capacity_bytes`, as
/// opposed to [`evict_until_under_capacity`] which is used on the `put` path.
pub fn evict_to_capacity<F1, F2>(
    capacity_bytes: u64,
    mut used_bytes: u64,
    mut pop_farthest: F1,
    mut remove: F2,
) -> StoreResult<u32>
where
    F1: FnMut() -> StoreResult<Option<(ContentId, u64)>>,
    F2: FnMut(ContentId) -> StoreResult<()>,
{
    let mut removed = 0u32;
    while used_bytes > capacity_bytes {
        let Some((farthest_id, byte_len)) = pop_farthest()? else {
            break;
        };
        remove(farthest_id)?;
        used_bytes = used_bytes.saturating_sub(byte_len);
        removed = removed.saturating_add(1);
    }
    Ok(removed)
}
