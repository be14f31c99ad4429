//! Shared key/value byte stores.
//!
//! Behaviors get two of these through their processing context: one scoped to
//! their model and one global to the engine.  Values are opaque byte blobs
//! (the engine never interprets payloads), stored behind `Arc` so a `get`
//! hands out a cheap reference-counted view instead of copying.
//!
//! Every operation reports a [`CacheOperationStatus`] rather than an error:
//! "key absent" is an ordinary outcome, not a failure.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rustc_hash::FxHashMap;

use crate::status::CacheOperationStatus;

type Store = FxHashMap<String, Arc<[u8]>>;

// ── CacheResult ──────────────────────────────────────────────────────────────

/// The outcome of one shared-data operation.
#[derive(Clone, Debug)]
pub struct CacheResult {
    pub status: CacheOperationStatus,
    /// The retrieved or removed value, when the operation produced one.
    pub value:  Option<Arc<[u8]>>,
}

impl CacheResult {
    fn of(status: CacheOperationStatus) -> Self {
        Self { status, value: None }
    }
}

// ── SharedData ───────────────────────────────────────────────────────────────

/// A clonable handle to one shared store.  Clones see the same underlying map.
#[derive(Clone, Default)]
pub struct SharedData {
    inner: Arc<RwLock<Store>>,
}

impl SharedData {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock here means some thread panicked mid-operation; the map
    // itself is a plain insert/remove target and cannot be left torn, so
    // recover the guard instead of propagating.
    fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Retrieve the value under `key`.
    pub fn get(&self, key: &str) -> CacheResult {
        match self.read().get(key) {
            Some(value) => CacheResult {
                status: CacheOperationStatus::ObjectRetrieved,
                value:  Some(Arc::clone(value)),
            },
            None => CacheResult::of(CacheOperationStatus::ObjectDoesNotExist),
        }
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn put(&self, key: &str, value: Vec<u8>) -> CacheResult {
        self.write().insert(key.to_owned(), Arc::from(value));
        CacheResult::of(CacheOperationStatus::ObjectPut)
    }

    /// Remove the value under `key`, returning it when present.
    pub fn remove(&self, key: &str) -> CacheResult {
        match self.write().remove(key) {
            Some(value) => CacheResult {
                status: CacheOperationStatus::ObjectRemoved,
                value:  Some(value),
            },
            None => CacheResult::of(CacheOperationStatus::ObjectDoesNotExist),
        }
    }

    /// Remove every entry.
    pub fn clear(&self) -> CacheResult {
        self.write().clear();
        CacheResult::of(CacheOperationStatus::CacheCleared)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
