//! In-process keyed store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::config::ReaperConfig;
use super::reaper::Reaper;
use super::{KeyedStore, StoreKey};
use crate::error::Error;

/// A [`KeyedStore`] held in a sharded concurrent map.
///
/// The dashmap entry API holds the shard lock across the presence check and
/// the insert, which gives the per-key atomicity the engine needs.
pub struct MemoryStore {
    entries: Arc<DashMap<Vec<u8>, Vec<u8>>>,
    next_id: AtomicU64,
    reaper: Reaper,
}

impl MemoryStore {
    /// Create an empty store with the default reaper settings.
    pub fn new() -> Self {
        Self::with_reaper(ReaperConfig::default())
    }

    /// Create an empty store with the given reaper settings.
    pub fn with_reaper(config: ReaperConfig) -> Self {
        let entries: Arc<DashMap<Vec<u8>, Vec<u8>>> = Arc::new(DashMap::new());
        let reaper_entries = entries.clone();
        let reaper = Reaper::start(
            Arc::new(move |key: &[u8]| -> Result<(), Error> {
                reaper_entries.remove(key);
                Ok(())
            }),
            config,
        );

        Self {
            entries,
            next_id: AtomicU64::new(1),
            reaper,
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyedStore for MemoryStore {
    fn create_if_absent(&self, key: &StoreKey, value: &[u8]) -> Result<bool, Error> {
        match self.entries.entry(key.encode()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(value.to_vec());
                Ok(true)
            }
        }
    }

    fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.entries.get(&key.encode()).map(|v| v.value().clone()))
    }

    fn put(&self, key: &StoreKey, value: &[u8]) -> Result<(), Error> {
        self.entries.insert(key.encode(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &StoreKey) -> Result<(), Error> {
        self.entries.remove(&key.encode());
        Ok(())
    }

    fn delete_async(&self, key: &StoreKey) {
        self.reaper.enqueue(key.encode());
    }

    fn delete_multi(&self, keys: &[StoreKey]) -> Result<(), Error> {
        for key in keys {
            self.entries.remove(&key.encode());
        }
        Ok(())
    }

    fn generate_id(&self) -> Result<u64, Error> {
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn flush(&self) -> Result<(), Error> {
        self.reaper.wait_idle()
    }

    fn pending_deletes(&self) -> usize {
        self.reaper.backlog()
    }
}
