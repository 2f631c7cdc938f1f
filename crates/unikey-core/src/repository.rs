//! Entity persistence with unique constraint hooks.
//!
//! [`Repository`] is the persistence boundary the enforcer is called from.
//! Records are stored as JSON under `(E::KIND, id)`. Loading captures a
//! [`Snapshot`] so a later update knows which reservations to move.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::enforcer::{ConstraintEnforcer, EnforcerConfig};
use crate::entity::{Entity, Snapshot};
use crate::error::Error;
use crate::registry::ConstraintRegistry;
use crate::store::{KeyedStore, StoreKey};

/// An entity as loaded from storage, with the snapshot taken at load time.
#[derive(Debug, Clone)]
pub struct Loaded<E> {
    entity: E,
    snapshot: Snapshot,
}

impl<E: Entity> Loaded<E> {
    fn new(entity: E) -> Self {
        let snapshot = Snapshot::capture(&entity);
        Self { entity, snapshot }
    }

    /// Values as last loaded or saved.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Check whether any of `properties` changed since load.
    pub fn changed(&self, properties: &[&str]) -> bool {
        let properties: Vec<String> = properties.iter().map(|p| p.to_string()).collect();
        self.snapshot.changed(&self.entity, &properties)
    }

    /// Discard the snapshot and return the entity.
    pub fn into_inner(self) -> E {
        self.entity
    }
}

impl<E> Deref for Loaded<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.entity
    }
}

impl<E> DerefMut for Loaded<E> {
    fn deref_mut(&mut self) -> &mut E {
        &mut self.entity
    }
}

/// Stores entities of type `E` and keeps their sentinels in step.
pub struct Repository<E: Entity, S: KeyedStore + ?Sized> {
    store: Arc<S>,
    enforcer: ConstraintEnforcer<E, S>,
}

impl<E, S> Repository<E, S>
where
    E: Entity + Serialize + DeserializeOwned,
    S: KeyedStore + ?Sized,
{
    /// Create a repository with the default enforcer configuration.
    pub fn new(store: Arc<S>, registry: ConstraintRegistry<E>) -> Self {
        Self::with_config(store, registry, EnforcerConfig::default())
    }

    /// Create a repository with an explicit enforcer configuration.
    pub fn with_config(store: Arc<S>, registry: ConstraintRegistry<E>, config: EnforcerConfig) -> Self {
        let enforcer = ConstraintEnforcer::with_config(Arc::new(registry), store.clone(), config);
        Self { store, enforcer }
    }

    /// The constraint enforcer.
    pub fn enforcer(&self) -> &ConstraintEnforcer<E, S> {
        &self.enforcer
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Store key of entity `id`.
    pub fn key(id: u64) -> StoreKey {
        StoreKey::new(E::KIND, id.to_string())
    }

    /// Persist a new entity.
    ///
    /// Constraints are reserved first, then the entity gets an id (unless it
    /// already has one) and its record is created. If the record cannot be
    /// written, the reservations are released again.
    #[instrument(skip_all, fields(entity = E::KIND))]
    pub fn create(&self, mut entity: E) -> Result<Loaded<E>, Error> {
        self.enforcer.before_create(&mut entity)?;

        match self.insert_record(&mut entity) {
            Ok(id) => {
                debug!(id, "created");
                Ok(Loaded::new(entity))
            }
            Err(e) => {
                if let Err(release) = self.enforcer.release(&entity) {
                    error!(error = %release, "failed to release sentinels of rejected entity");
                }
                Err(e)
            }
        }
    }

    fn insert_record(&self, entity: &mut E) -> Result<u64, Error> {
        let id = match entity.id() {
            Some(id) => id,
            None => {
                let id = self.store.generate_id()?;
                entity.set_id(id);
                id
            }
        };
        let bytes = encode(&*entity)?;
        if !self.store.create_if_absent(&Self::key(id), &bytes)? {
            return Err(Error::AlreadyExists {
                entity: E::KIND.to_string(),
                id,
            });
        }
        Ok(id)
    }

    /// Load an entity and capture its snapshot.
    pub fn get(&self, id: u64) -> Result<Option<Loaded<E>>, Error> {
        match self.store.get(&Self::key(id))? {
            Some(bytes) => Ok(Some(Loaded::new(decode(&bytes)?))),
            None => Ok(None),
        }
    }

    /// Persist changes to a loaded entity.
    ///
    /// Reservations of changed constraints move to the new values before the
    /// record is written; the snapshot is refreshed afterwards. If the record
    /// cannot be written, the reservations are moved back.
    #[instrument(skip_all, fields(entity = E::KIND, id = ?loaded.id()))]
    pub fn update(&self, loaded: &mut Loaded<E>) -> Result<(), Error> {
        let id = loaded.entity.id().ok_or_else(|| Error::MissingIdentity {
            entity: E::KIND.to_string(),
        })?;

        let Loaded { entity, snapshot } = loaded;
        self.enforcer.before_update(snapshot, entity)?;

        let written = encode(&*entity).and_then(|bytes| self.store.put(&Self::key(id), &bytes));
        if let Err(e) = written {
            self.enforcer.undo_update(snapshot, entity);
            return Err(e);
        }
        *snapshot = Snapshot::capture(&*entity);
        Ok(())
    }

    /// Delete an entity and queue the release of its sentinels.
    ///
    /// The record goes first, so a failed delete leaves the entity and its
    /// sentinels in place. Deleting an id that does not exist is logged and
    /// treated as done.
    #[instrument(skip_all, fields(entity = E::KIND, id = id))]
    pub fn delete(&self, id: u64) -> Result<(), Error> {
        let Some(loaded) = self.get(id)? else {
            error!("delete: instance not found");
            return Ok(());
        };

        self.store.delete(&Self::key(id))?;
        self.enforcer.before_delete(&loaded)?;
        debug!("deleted");
        Ok(())
    }
}

fn encode<E: Serialize>(entity: &E) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(entity).map_err(|e| Error::Serialization(e.to_string()))
}

fn decode<E: DeserializeOwned>(bytes: &[u8]) -> Result<E, Error> {
    serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::entity::test_support::Account;
    use crate::fingerprint::fingerprint_of;
    use crate::store::MemoryStore;
    use crate::value::Value;

    /// Memory store whose record writes and deletes can be made to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_put: AtomicBool,
        fail_delete: AtomicBool,
    }

    impl KeyedStore for FlakyStore {
        fn create_if_absent(&self, key: &StoreKey, value: &[u8]) -> Result<bool, Error> {
            self.inner.create_if_absent(key, value)
        }
        fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, Error> {
            self.inner.get(key)
        }
        fn put(&self, key: &StoreKey, value: &[u8]) -> Result<(), Error> {
            if self.fail_put.load(Ordering::SeqCst) {
                return Err(Error::Transaction("put rejected".to_string()));
            }
            self.inner.put(key, value)
        }
        fn delete(&self, key: &StoreKey) -> Result<(), Error> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(Error::Transaction("delete rejected".to_string()));
            }
            self.inner.delete(key)
        }
        fn delete_async(&self, key: &StoreKey) {
            self.inner.delete_async(key)
        }
        fn delete_multi(&self, keys: &[StoreKey]) -> Result<(), Error> {
            self.inner.delete_multi(keys)
        }
        fn generate_id(&self) -> Result<u64, Error> {
            self.inner.generate_id()
        }
        fn flush(&self) -> Result<(), Error> {
            self.inner.flush()
        }
        fn pending_deletes(&self) -> usize {
            self.inner.pending_deletes()
        }
    }

    fn email_held<S: KeyedStore + ?Sized>(repo: &Repository<Account, S>, email: &str) -> bool {
        let fingerprint = fingerprint_of(&[("email".to_string(), Value::from(email))]);
        repo.enforcer().sentinels().exists(&fingerprint).unwrap()
    }

    fn repository() -> Repository<Account, MemoryStore> {
        let registry = ConstraintRegistry::new().unique(["email"]).unwrap();
        Repository::new(Arc::new(MemoryStore::new()), registry)
    }

    #[test]
    fn test_create_assigns_id_and_roundtrips() {
        let repo = repository();
        let created = repo.create(Account::new("acme", "a@acme.io", "ann")).unwrap();
        let id = created.id.unwrap();

        let loaded = repo.get(id).unwrap().unwrap();
        assert_eq!(*loaded, *created);
        assert!(!loaded.changed(&["email"]));
    }

    #[test]
    fn test_create_with_existing_id_releases_sentinels() {
        let repo = repository();
        let mut first = Account::new("acme", "a@acme.io", "ann");
        first.id = Some(7);
        repo.create(first).unwrap();

        let mut second = Account::new("acme", "b@acme.io", "bob");
        second.id = Some(7);
        let err = repo.create(second).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { id: 7, .. }));

        repo.create(Account::new("acme", "b@acme.io", "bob")).unwrap();
    }

    #[test]
    fn test_update_refreshes_snapshot() {
        let repo = repository();
        let mut loaded = repo.create(Account::new("acme", "a@acme.io", "ann")).unwrap();

        loaded.email = "b@acme.io".to_string();
        assert!(loaded.changed(&["email"]));
        repo.update(&mut loaded).unwrap();
        assert!(!loaded.changed(&["email"]));

        let stored = repo.get(loaded.id.unwrap()).unwrap().unwrap();
        assert_eq!(stored.email, "b@acme.io");
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let repo = repository();
        repo.delete(12345).unwrap();
    }

    #[test]
    fn test_failed_write_moves_reservation_back() {
        let store = Arc::new(FlakyStore::default());
        let registry = ConstraintRegistry::new().unique(["email"]).unwrap();
        let repo = Repository::new(store.clone(), registry);
        let mut loaded = repo.create(Account::new("acme", "old@x.io", "ann")).unwrap();

        store.fail_put.store(true, Ordering::SeqCst);
        loaded.email = "new@x.io".to_string();
        assert!(repo.update(&mut loaded).is_err());
        store.fail_put.store(false, Ordering::SeqCst);

        let stored = repo.get(loaded.id.unwrap()).unwrap().unwrap();
        assert_eq!(stored.email, "old@x.io");
        assert!(email_held(&repo, "old@x.io"));
        assert!(!email_held(&repo, "new@x.io"));

        // The stored value cannot be taken by anyone else.
        assert!(repo.create(Account::new("acme", "old@x.io", "bob")).is_err());
        repo.create(Account::new("acme", "new@x.io", "bob")).unwrap();
    }

    #[test]
    fn test_failed_delete_keeps_sentinels() {
        let store = Arc::new(FlakyStore::default());
        let registry = ConstraintRegistry::new().unique(["email"]).unwrap();
        let repo = Repository::new(store.clone(), registry);
        let created = repo.create(Account::new("acme", "a@x.io", "ann")).unwrap();
        let id = created.id.unwrap();

        store.fail_delete.store(true, Ordering::SeqCst);
        assert!(repo.delete(id).is_err());
        store.fail_delete.store(false, Ordering::SeqCst);
        store.flush().unwrap();

        assert!(repo.get(id).unwrap().is_some());
        assert!(email_held(&repo, "a@x.io"));
    }

    #[test]
    fn test_update_without_id() {
        let repo = repository();
        let mut loaded = Loaded::new(Account::new("acme", "a@acme.io", "ann"));
        assert!(matches!(
            repo.update(&mut loaded),
            Err(Error::MissingIdentity { .. })
        ));
    }
}
