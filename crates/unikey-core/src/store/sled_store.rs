//! Sled-backed keyed store.

use std::sync::Arc;

use sled::transaction::{TransactionError, TransactionResult};
use sled::{Db, Tree};
use tracing::debug;

use super::config::StoreConfig;
use super::reaper::Reaper;
use super::{KeyedStore, StoreKey};
use crate::error::Error;

/// Tree holding entity records and sentinels.
const KEYS_TREE: &str = "keys";

/// A [`KeyedStore`] on a sled database.
///
/// Single-key create-if-absent runs as a sled transaction on one tree, which
/// sled retries internally on conflict, so racing writers serialize per key.
pub struct SledStore {
    db: Db,
    tree: Tree,
    reaper: Reaper,
}

impl SledStore {
    /// Open or create a store with the given configuration.
    pub fn open(config: StoreConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        Self::with_db(db, config)
    }

    /// Wrap an already opened sled database.
    pub fn with_db(db: Db, config: StoreConfig) -> Result<Self, Error> {
        let tree = db.open_tree(KEYS_TREE)?;

        let reaper_tree = tree.clone();
        let reaper = Reaper::start(
            Arc::new(move |key: &[u8]| -> Result<(), Error> {
                reaper_tree.remove(key)?;
                Ok(())
            }),
            config.reaper,
        );

        Ok(Self { db, tree, reaper })
    }

    /// Check if the database was recovered from a previous crash.
    pub fn was_recovered(&self) -> bool {
        self.db.was_recovered()
    }

    /// List the identities stored under `kind`.
    pub fn scan_kind(&self, kind: &str) -> Result<Vec<String>, Error> {
        let mut identities = Vec::new();
        for entry in self.tree.scan_prefix(StoreKey::kind_prefix(kind)) {
            let (key, _) = entry?;
            let key = StoreKey::decode(&key).ok_or(Error::InvalidKey)?;
            identities.push(key.identity().to_string());
        }
        Ok(identities)
    }
}

impl KeyedStore for SledStore {
    fn create_if_absent(&self, key: &StoreKey, value: &[u8]) -> Result<bool, Error> {
        let key_bytes = key.encode();

        let result: TransactionResult<bool, ()> = self.tree.transaction(|tx| {
            if tx.get(key_bytes.as_slice())?.is_some() {
                return Ok(false);
            }
            tx.insert(key_bytes.as_slice(), value)?;
            Ok(true)
        });

        match result {
            Ok(created) => {
                debug!(key = %key, created, "create_if_absent");
                Ok(created)
            }
            Err(TransactionError::Storage(e)) => Err(Error::Storage(e)),
            Err(TransactionError::Abort(())) => {
                Err(Error::Transaction(format!("create of {key} aborted")))
            }
        }
    }

    fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.tree.get(key.encode())?.map(|v| v.to_vec()))
    }

    fn put(&self, key: &StoreKey, value: &[u8]) -> Result<(), Error> {
        self.tree.insert(key.encode(), value)?;
        Ok(())
    }

    fn delete(&self, key: &StoreKey) -> Result<(), Error> {
        self.tree.remove(key.encode())?;
        Ok(())
    }

    fn delete_async(&self, key: &StoreKey) {
        self.reaper.enqueue(key.encode());
    }

    fn delete_multi(&self, keys: &[StoreKey]) -> Result<(), Error> {
        let mut batch = sled::Batch::default();
        for key in keys {
            batch.remove(key.encode());
        }
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    fn generate_id(&self) -> Result<u64, Error> {
        Ok(self.db.generate_id()?)
    }

    fn flush(&self) -> Result<(), Error> {
        self.reaper.wait_idle()?;
        self.db.flush()?;
        Ok(())
    }

    fn pending_deletes(&self) -> usize {
        self.reaper.backlog()
    }
}
