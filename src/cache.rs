//! CachedStore
//!
//! Write-back caching facade over a [`Store`]. Writes and deletes are
//! buffered in memory and applied to the Store only at flush; reads
//! resolve through the buffered state first and fall back to the Store,
//! caching the answer (absence included).
//!
//! Dropping the facade flushes: every pending delete is applied, then
//! every pending write, so a key deleted and later rewritten ends up
//! written. The facade never touches the file directly.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{trace, warn};

use crate::error::{PackError, Result};
use crate::record;
use crate::store::Store;

/// Buffered per-key state
///
/// One tagged state per key instead of three overlapping maps: a key is
/// confirmed (mirrors the Store, possibly as a cached absence), pending
/// write, pending delete, or not tracked at all. A key can never be both
/// pending-write and pending-delete.
#[derive(Debug, Clone)]
enum Slot {
    /// Last answer the Store gave for this key, absence included
    Confirmed(Option<Value>),

    /// Value written through the facade, not yet flushed
    PendingWrite(Value),

    /// Tombstone: deletion recorded, not yet flushed
    PendingDelete,
}

/// Write-back cache over a [`Store`]
///
/// Owns the Store for its lifetime and flushes into it when dropped;
/// [`CachedStore::into_store`] flushes and hands the Store back instead.
/// Single-threaded, like the Store it wraps.
pub struct CachedStore {
    /// Vacated only by `into_store`, which consumes the facade
    store: Option<Store>,
    slots: HashMap<Vec<u8>, Slot>,
}

impl CachedStore {
    /// Wrap a store in a write-back cache
    pub fn new(store: Store) -> Self {
        Self {
            store: Some(store),
            slots: HashMap::new(),
        }
    }

    /// Open a store file and wrap it in one step
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::new(Store::open(path)?))
    }

    /// Buffer a write; the Store is untouched until flush
    ///
    /// Replaces any tombstone for the key, and subsequent reads see the
    /// new value without hitting the Store. Keys the format cannot hold
    /// are rejected here rather than at flush time, where the caller may
    /// no longer be around to see the error.
    pub fn write(&mut self, key: &[u8], value: Value) -> Result<()> {
        record::check_key(key)?;
        self.slots.insert(key.to_vec(), Slot::PendingWrite(value));
        Ok(())
    }

    /// Read through the cache
    ///
    /// Tombstoned keys read as absent. Unknown keys delegate to the Store
    /// and the answer is cached either way.
    pub fn read(&mut self, key: &[u8]) -> Result<Option<Value>> {
        match self.slots.get(key) {
            Some(Slot::PendingDelete) => Ok(None),
            Some(Slot::PendingWrite(v)) => Ok(Some(v.clone())),
            Some(Slot::Confirmed(v)) => Ok(v.clone()),
            None => {
                let value = match self.store.as_mut() {
                    Some(store) => store.read(key)?,
                    None => None,
                };
                trace!(key_len = key.len(), hit = value.is_some(), "read-through");
                self.slots
                    .insert(key.to_vec(), Slot::Confirmed(value.clone()));
                Ok(value)
            }
        }
    }

    /// Check for a key through the cache
    pub fn exists(&self, key: &[u8]) -> bool {
        match self.slots.get(key) {
            Some(Slot::PendingDelete) => false,
            Some(Slot::PendingWrite(_)) => true,
            // A confirmed slot mirrors the Store, so delegating matches it.
            Some(Slot::Confirmed(_)) | None => {
                self.store.as_ref().map_or(false, |s| s.exists(key))
            }
        }
    }

    /// Buffer a delete
    ///
    /// Recorded as a tombstone whether or not the key exists below; a
    /// tombstone for an absent key is a no-op at flush time. Clears any
    /// pending write and cached value for the key.
    pub fn delete(&mut self, key: &[u8]) {
        self.slots.insert(key.to_vec(), Slot::PendingDelete);
    }

    /// All visible keys: the Store's keys minus tombstones, plus pending
    /// writes (order unspecified)
    pub fn keys(&self) -> Vec<Vec<u8>> {
        let mut keys: Vec<Vec<u8>> = match &self.store {
            Some(store) => store
                .keys()
                .filter(|k| !matches!(self.slots.get(*k), Some(Slot::PendingDelete)))
                .map(|k| k.to_vec())
                .collect(),
            None => Vec::new(),
        };

        for (key, slot) in &self.slots {
            if matches!(slot, Slot::PendingWrite(_)) && !keys.contains(key) {
                keys.push(key.clone());
            }
        }

        keys
    }

    /// Mark everything currently in the Store for deletion
    ///
    /// Drops all cached values and pending writes, then tombstones every
    /// Store key. The file itself is untouched until flush.
    pub fn clear(&mut self) {
        let store_keys: Vec<Vec<u8>> = match &self.store {
            Some(store) => store.keys().map(|k| k.to_vec()).collect(),
            None => Vec::new(),
        };

        self.slots.clear();
        for key in store_keys {
            self.slots.insert(key, Slot::PendingDelete);
        }
    }

    /// Apply all pending deletes, then all pending writes, to the Store
    ///
    /// Delete-before-write ordering: a key deleted and then rewritten
    /// holds a single pending-write slot, so it is simply written. Each
    /// slot is retired only once its operation lands, so a mid-flush
    /// error leaves every unapplied mutation buffered and the flush can
    /// be retried. After a full flush the facade holds no buffered state.
    pub fn flush(&mut self) -> Result<()> {
        let store = match self.store.as_mut() {
            Some(store) => store,
            None => return Ok(()),
        };

        let deletes: Vec<Vec<u8>> = self
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::PendingDelete))
            .map(|(key, _)| key.clone())
            .collect();
        for key in deletes {
            store.delete(&key)?;
            self.slots.remove(&key);
        }

        let writes: Vec<Vec<u8>> = self
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::PendingWrite(_)))
            .map(|(key, _)| key.clone())
            .collect();
        for key in writes {
            if let Some(Slot::PendingWrite(value)) = self.slots.get(&key) {
                store.write(&key, value)?;
            }
            self.slots.remove(&key);
        }

        // Only confirmed-cache entries are left; drop those too.
        self.slots.clear();
        Ok(())
    }

    /// Flush and hand back the underlying store
    pub fn into_store(mut self) -> Result<Store> {
        self.flush()?;
        // The only place the store is taken; `self` is consumed and its
        // drop-time flush sees an empty facade.
        Ok(self
            .store
            .take()
            .expect("store present until into_store"))
    }

    /// Number of keys with buffered (unflushed) mutations
    pub fn pending(&self) -> usize {
        self.slots
            .values()
            .filter(|s| !matches!(s, Slot::Confirmed(_)))
            .count()
    }

    // =========================================================================
    // Serde Sugar
    // =========================================================================

    /// Buffer a write of any serializable value
    pub fn put<T: Serialize>(&mut self, key: &[u8], value: &T) -> Result<()> {
        let value =
            serde_json::to_value(value).map_err(|e| PackError::CorruptValue(e.to_string()))?;
        self.write(key, value)
    }

    /// Read and deserialize through the cache
    pub fn get<T: DeserializeOwned>(&mut self, key: &[u8]) -> Result<Option<T>> {
        match self.read(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| PackError::CorruptValue(e.to_string())),
            None => Ok(None),
        }
    }
}

impl Drop for CachedStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "flush on drop failed; pending mutations lost");
        }
    }
}
