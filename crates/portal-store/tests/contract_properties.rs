//! Property-based coverage of the quantified store invariants, run against
//! both backends where the property does not inherently require durability.

use portal_distance::ContentId;
use portal_store::{ContentStore, MemoryStore, SledStore, StoreConfig, StoreError};
use proptest::prelude::*;
use tempfile::tempdir;

fn cid(seed: u8) -> ContentId {
    let mut id = [0u8; 32];
    id[31] = seed;
    id
}

proptest! {
    /// P1: a `Get` right after the matching `Put`, with no intervening write
    /// large enough to evict it, returns exactly what was put.
    #[test]
    fn p1_get_after_put_returns_latest_value(seed in 0u8..=255, blob in proptest::collection::vec(any::<u8>(), 0..64)) {
        let store = MemoryStore::new(StoreConfig::new([0u8; 32], 10_000_000, "unused"));
        store.put(cid(seed), &blob).unwrap();
        prop_assert_eq!(store.get(&cid(seed)).unwrap(), blob);
    }

    /// P2: after any `Put`, either used_size is within budget or the put
    /// outcome reports self-eviction.
    #[test]
    fn p2_put_never_leaves_store_over_capacity_unless_self_pruned(
        blobs in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..200), 1..20)
    ) {
        let store = MemoryStore::new(StoreConfig::new([0u8; 32], 1_000, "unused"));
        for (i, blob) in blobs.iter().enumerate() {
            let outcome = store.put(cid(i as u8), blob).unwrap();
            let used = store.used_size().unwrap();
            prop_assert!(used <= 1_000 || outcome.pruned);
        }
    }

    /// P3: after ForcePrune(R), every remaining entry is within R.
    #[test]
    fn p3_force_prune_bounds_every_surviving_distance(
        distances in proptest::collection::hash_set(0u64..1_000, 1..30),
        radius in 0u64..1_000,
    ) {
        let store = MemoryStore::new(StoreConfig::new([0u8; 32], 10_000_000, "unused"));
        for d in &distances {
            let mut id = [0u8; 32];
            id[24..].copy_from_slice(&d.to_be_bytes());
            store.put(id, b"x").unwrap();
        }
        store.force_prune(radius.into()).unwrap();
        for entry in store.iter_by_distance_desc().unwrap() {
            let entry = entry.unwrap();
            prop_assert!(entry.distance <= radius.into());
        }
    }
}

#[test]
fn p4_close_is_idempotent_for_both_backends() {
    let store = MemoryStore::new(StoreConfig::new([0u8; 32], 1024, "unused"));
    store.close().unwrap();
    store.close().unwrap();

    let dir = tempdir().unwrap();
    let store = SledStore::open(StoreConfig::new([0u8; 32], 1024, dir.path())).unwrap();
    store.close().unwrap();
    store.close().unwrap();
}

proptest! {
    /// P5: a durable store survives a simulated restart with every
    /// previously successful Put readable byte-for-byte.
    #[test]
    fn p5_sled_store_survives_restart(
        blobs in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..64), 1..8)
    ) {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new([0u8; 32], 10_000_000, dir.path());
        {
            let store = SledStore::open(config.clone()).unwrap();
            for (i, blob) in blobs.iter().enumerate() {
                store.put(cid(i as u8), blob).unwrap();
            }
            store.close().unwrap();
        }
        let reopened = SledStore::open(config).unwrap();
        for (i, blob) in blobs.iter().enumerate() {
            prop_assert_eq!(&reopened.get(&cid(i as u8)).unwrap(), blob);
        }
    }
}

#[test]
fn get_missing_after_delete_is_not_found() {
    let store = MemoryStore::new(StoreConfig::new([0u8; 32], 1024, "unused"));
    store.put(cid(1), b"x").unwrap();
    store.delete(&cid(1)).unwrap();
    assert!(matches!(store.get(&cid(1)), Err(StoreError::NotFound(_))));
}
