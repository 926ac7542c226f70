//! Integration tests for flatpack
//!
//! End-to-end flows across Store and CachedStore, including persistence
//! across reopen and mixed mutation sequences.

use serde_json::json;
use tempfile::TempDir;

use flatpack::{CachedStore, Store};

// =============================================================================
// Store + Cache Lifecycle
// =============================================================================

#[test]
fn test_cached_session_over_seeded_store() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("data.db");

    // Session 1: direct writes.
    {
        let mut store = Store::open(&path).unwrap();
        store.write(b"config", &json!({"retries": 3})).unwrap();
        store.write(b"stale", &json!("drop me")).unwrap();
    }

    // Session 2: everything goes through the cache and lands on drop.
    {
        let mut cache = CachedStore::open(&path).unwrap();
        assert_eq!(cache.read(b"config").unwrap(), Some(json!({"retries": 3})));

        cache.write(b"config", json!({"retries": 5})).unwrap();
        cache.delete(b"stale");
        cache.write(b"fresh", json!([1, 2, 3])).unwrap();
    }

    // Session 3: verify the net effect survived.
    let mut store = Store::open(&path).unwrap();
    assert_eq!(store.read(b"config").unwrap(), Some(json!({"retries": 5})));
    assert_eq!(store.read(b"fresh").unwrap(), Some(json!([1, 2, 3])));
    assert!(!store.exists(b"stale"));
    assert_eq!(store.len(), 2);
}

#[test]
fn test_many_records_survive_interleaved_mutations() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("data.db");

    let mut store = Store::open(&path).unwrap();
    for i in 0..50u32 {
        store
            .write(format!("key-{i:03}").as_bytes(), &json!(i))
            .unwrap();
    }

    // Delete every third key, overwrite every fifth.
    for i in (0..50u32).step_by(3) {
        store.delete(format!("key-{i:03}").as_bytes()).unwrap();
    }
    for i in (0..50u32).step_by(5) {
        store
            .write(format!("key-{i:03}").as_bytes(), &json!(i * 100))
            .unwrap();
    }

    drop(store);
    let mut store = Store::open(&path).unwrap();

    for i in 0..50u32 {
        let key = format!("key-{i:03}");
        let value = store.read(key.as_bytes()).unwrap();
        if i % 5 == 0 {
            assert_eq!(value, Some(json!(i * 100)), "{key}");
        } else if i % 3 == 0 {
            assert_eq!(value, None, "{key}");
        } else {
            assert_eq!(value, Some(json!(i)), "{key}");
        }
    }
}

#[test]
fn test_clear_via_cache_then_repopulate() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("data.db");

    {
        let mut store = Store::open(&path).unwrap();
        store.write(b"a", &json!(1)).unwrap();
        store.write(b"b", &json!(2)).unwrap();
    }

    {
        let mut cache = CachedStore::open(&path).unwrap();
        cache.clear();
        cache.write(b"c", json!(3)).unwrap();
    }

    let mut store = Store::open(&path).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store.read(b"c").unwrap(), Some(json!(3)));
}
