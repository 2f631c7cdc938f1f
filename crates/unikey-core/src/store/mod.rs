//! Keyed storage layer.
//!
//! The constraint engine only needs a store with atomic create-if-absent on a
//! single key plus plain get/put/delete. [`KeyedStore`] is that contract;
//! [`SledStore`] and [`MemoryStore`] implement it.

mod config;
mod memory;
mod reaper;
mod sled_store;

pub mod key;

pub use config::{ReaperConfig, StoreConfig};
pub use key::StoreKey;
pub use memory::MemoryStore;
pub use sled_store::SledStore;

use crate::error::Error;

/// A keyed store with per-key atomic writes.
///
/// Implementations must make [`create_if_absent`](KeyedStore::create_if_absent)
/// linearizable per key: of any number of concurrent callers racing on the same
/// key, exactly one observes `true`. Nothing is promised across keys.
pub trait KeyedStore: Send + Sync {
    /// Write `value` under `key` only if the key is absent, as one atomic
    /// single-key transaction. Returns true only if this call wrote.
    fn create_if_absent(&self, key: &StoreKey, value: &[u8]) -> Result<bool, Error>;

    /// Read the value under `key`.
    fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, Error>;

    /// Write `value` under `key`, replacing any previous value.
    fn put(&self, key: &StoreKey, value: &[u8]) -> Result<(), Error>;

    /// Remove `key`. Removing an absent key is not an error.
    fn delete(&self, key: &StoreKey) -> Result<(), Error>;

    /// Queue `key` for removal without waiting. The delete is retried in the
    /// background until it applies.
    fn delete_async(&self, key: &StoreKey);

    /// Remove several keys. Each removal is independent; there is no atomicity
    /// across keys.
    fn delete_multi(&self, keys: &[StoreKey]) -> Result<(), Error>;

    /// Allocate a new unique identity value.
    fn generate_id(&self) -> Result<u64, Error>;

    /// Wait for queued deletes and persist buffered writes.
    fn flush(&self) -> Result<(), Error>;

    /// Number of queued deletes not yet applied.
    fn pending_deletes(&self) -> usize;

    /// Check whether `key` is present.
    fn contains(&self, key: &StoreKey) -> Result<bool, Error> {
        Ok(self.get(key)?.is_some())
    }
}
