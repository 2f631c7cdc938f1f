//! Sentinel records.
//!
//! A sentinel is an empty record whose key is a fingerprint. Its existence is
//! the reservation: whoever creates it first holds that value combination.
//! Sentinels never point back at their owner.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::entity::Entity;
use crate::error::Error;
use crate::store::{KeyedStore, StoreKey};

/// Suffix appended to an entity kind to form its sentinel namespace.
pub const SENTINEL_SUFFIX: &str = "Unique";

/// Sentinel namespace for an entity kind.
pub fn sentinel_kind(entity_kind: &str) -> String {
    format!("{entity_kind}{SENTINEL_SUFFIX}")
}

/// A sentinel record: a namespace plus the fingerprint it reserves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sentinel {
    kind: String,
    fingerprint: String,
}

impl Sentinel {
    /// Create a sentinel in an explicit namespace.
    pub fn new(kind: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fingerprint: fingerprint.into(),
        }
    }

    /// Create a sentinel in the namespace of entity type `E`.
    pub fn for_entity<E: Entity>(fingerprint: impl Into<String>) -> Self {
        Self::new(sentinel_kind(E::KIND), fingerprint)
    }

    /// The namespace.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The reserved fingerprint.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Store key of this sentinel.
    pub fn key(&self) -> StoreKey {
        StoreKey::new(self.kind.clone(), self.fingerprint.clone())
    }
}

/// Create and delete sentinels of one namespace.
pub struct SentinelStore<S: KeyedStore + ?Sized> {
    store: Arc<S>,
    kind: String,
}

impl<S: KeyedStore + ?Sized> Clone for SentinelStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            kind: self.kind.clone(),
        }
    }
}

impl<S: KeyedStore + ?Sized> SentinelStore<S> {
    /// Sentinels in namespace `kind`.
    pub fn new(store: Arc<S>, kind: impl Into<String>) -> Self {
        Self {
            store,
            kind: kind.into(),
        }
    }

    /// Sentinels of entity type `E`.
    pub fn for_entity<E: Entity>(store: Arc<S>) -> Self {
        Self::new(store, sentinel_kind(E::KIND))
    }

    /// The namespace.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn key(&self, fingerprint: &str) -> StoreKey {
        StoreKey::new(self.kind.as_str(), fingerprint)
    }

    /// Reserve `fingerprint`. Returns true only if this call created it.
    pub fn create_if_absent(&self, fingerprint: &str) -> Result<bool, Error> {
        self.store.create_if_absent(&self.key(fingerprint), &[])
    }

    /// Check whether `fingerprint` is reserved.
    pub fn exists(&self, fingerprint: &str) -> Result<bool, Error> {
        self.store.contains(&self.key(fingerprint))
    }

    /// Release `fingerprint` and wait for the store to apply it.
    pub fn delete(&self, fingerprint: &str) -> Result<(), Error> {
        self.store.delete(&self.key(fingerprint))
    }

    /// Release `fingerprint` in the background.
    pub fn delete_async(&self, fingerprint: &str) {
        self.store.delete_async(&self.key(fingerprint));
    }

    /// Release several fingerprints.
    pub fn delete_multi(&self, fingerprints: &[String]) -> Result<(), Error> {
        let keys: Vec<StoreKey> = fingerprints.iter().map(|f| self.key(f)).collect();
        self.store.delete_multi(&keys)
    }

    /// Reserve fingerprints in order, stopping at the first one already held.
    ///
    /// Returns exactly the prefix this call created. If the store fails part
    /// way, the created prefix is released before the error is returned.
    pub fn create_multi(&self, fingerprints: &[String]) -> Result<Vec<String>, Error> {
        let mut created = Vec::with_capacity(fingerprints.len());
        for fingerprint in fingerprints {
            match self.create_if_absent(fingerprint) {
                Ok(true) => created.push(fingerprint.clone()),
                Ok(false) => {
                    debug!(kind = %self.kind, %fingerprint, "create_multi stopped at held key");
                    break;
                }
                Err(e) => {
                    if let Err(rollback) = self.delete_multi(&created) {
                        warn!(
                            kind = %self.kind,
                            count = created.len(),
                            error = %rollback,
                            "failed to release partial create_multi"
                        );
                    }
                    return Err(e);
                }
            }
        }
        Ok(created)
    }
}
