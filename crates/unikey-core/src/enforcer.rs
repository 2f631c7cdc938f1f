//! Unique constraint enforcement over sentinels.
//!
//! The enforcer is called from the persistence boundary before an entity is
//! created, updated or deleted:
//!
//! ```text
//! create:  for each constraint  reserve(fingerprint(current))
//! update:  for each changed     delete(fingerprint(snapshot)); reserve(fingerprint(current))
//! delete:  for each constraint  delete_async(fingerprint(current))
//! ```
//!
//! `reserve` retries through the constraint's resolver, up to
//! [`EnforcerConfig::max_attempts`] store round trips.
//!
//! Each step is its own single-key transaction. Between releasing the old
//! sentinel and reserving the new one on update, neither value is held.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::entity::{read_property, Entity, Snapshot};
use crate::error::{Error, UniqueConstraintViolation};
use crate::fingerprint;
use crate::registry::{Constraint, ConstraintRegistry};
use crate::sentinel::SentinelStore;
use crate::store::KeyedStore;
use crate::value::Value;

/// Default bound on reservation attempts per constraint.
pub const DEFAULT_MAX_ATTEMPTS: usize = 100;

/// Configuration for the constraint enforcer.
#[derive(Debug, Clone)]
pub struct EnforcerConfig {
    /// Store round trips per constraint before giving up.
    pub max_attempts: usize,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl EnforcerConfig {
    /// Set the attempt bound. Values below 1 are treated as 1.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

/// Enforces the constraints of entity type `E` against a keyed store.
pub struct ConstraintEnforcer<E: Entity, S: KeyedStore + ?Sized> {
    registry: Arc<ConstraintRegistry<E>>,
    sentinels: SentinelStore<S>,
    config: EnforcerConfig,
}

impl<E: Entity, S: KeyedStore + ?Sized> ConstraintEnforcer<E, S> {
    /// Create an enforcer with the default configuration.
    pub fn new(registry: Arc<ConstraintRegistry<E>>, store: Arc<S>) -> Self {
        Self::with_config(registry, store, EnforcerConfig::default())
    }

    /// Create an enforcer with an explicit configuration.
    pub fn with_config(registry: Arc<ConstraintRegistry<E>>, store: Arc<S>, config: EnforcerConfig) -> Self {
        Self {
            registry,
            sentinels: SentinelStore::for_entity::<E>(store),
            config,
        }
    }

    /// The constraint registry.
    pub fn registry(&self) -> &ConstraintRegistry<E> {
        &self.registry
    }

    /// The sentinel store of `E`.
    pub fn sentinels(&self) -> &SentinelStore<S> {
        &self.sentinels
    }

    /// Fingerprint and values of `constraint` for the entity's current values.
    pub fn fingerprint(&self, constraint: &Constraint, entity: &E) -> Result<(String, Vec<(String, Value)>), Error> {
        fingerprint::derive(constraint.properties(), |name| read_property(entity, name))
    }

    /// Reserve every constraint for a new entity.
    ///
    /// If a later constraint fails, sentinels reserved earlier in this call
    /// are released before the error is returned.
    #[instrument(skip_all, fields(entity = E::KIND))]
    pub fn before_create(&self, entity: &mut E) -> Result<(), Error> {
        let mut reserved = Vec::with_capacity(self.registry.len());
        for constraint in self.registry.constraints() {
            match self.reserve_with_retry(constraint, entity) {
                Ok(fingerprint) => reserved.push(fingerprint),
                Err(e) => {
                    self.release_quietly(&reserved);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Move reservations of changed constraints from the snapshot values to
    /// the current values.
    ///
    /// If a constraint fails, sentinels reserved in this call are released
    /// and the old sentinels released in this call are reserved again, when
    /// nobody took them in the meantime.
    #[instrument(skip_all, fields(entity = E::KIND, id = ?entity.id()))]
    pub fn before_update(&self, snapshot: &Snapshot, entity: &mut E) -> Result<(), Error> {
        let mut released = Vec::new();
        let mut reserved = Vec::new();

        for constraint in self.registry.constraints() {
            if !snapshot.changed(&*entity, constraint.properties()) {
                continue;
            }

            let step = self.snapshot_fingerprint(constraint, snapshot).and_then(|old| {
                self.sentinels.delete(&old)?;
                released.push(old);
                self.reserve_with_retry(constraint, entity)
            });

            match step {
                Ok(fingerprint) => reserved.push(fingerprint),
                Err(e) => {
                    self.release_quietly(&reserved);
                    self.restore_quietly(&released);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Reverse a successful [`before_update`](Self::before_update) whose write
    /// was then rejected.
    ///
    /// For every constraint that differs between `snapshot` and `entity`, the
    /// sentinel of the current values is released and the snapshot's sentinel
    /// is reserved again if it is still free.
    #[instrument(skip_all, fields(entity = E::KIND, id = ?entity.id()))]
    pub fn undo_update(&self, snapshot: &Snapshot, entity: &E) {
        let mut reserved = Vec::new();
        let mut released = Vec::new();

        for constraint in self.registry.constraints() {
            if !snapshot.changed(entity, constraint.properties()) {
                continue;
            }
            match (
                self.fingerprint(constraint, entity),
                self.snapshot_fingerprint(constraint, snapshot),
            ) {
                (Ok((current, _)), Ok(old)) => {
                    reserved.push(current);
                    released.push(old);
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!(constraint = constraint.name(), error = %e, "cannot undo sentinel move");
                }
            }
        }

        self.release_quietly(&reserved);
        self.restore_quietly(&released);
    }

    /// Release every sentinel of a deleted entity.
    ///
    /// Deletes are queued on the store and applied in the background.
    #[instrument(skip_all, fields(entity = E::KIND, id = ?entity.id()))]
    pub fn before_delete(&self, entity: &E) -> Result<(), Error> {
        for constraint in self.registry.constraints() {
            let (fingerprint, _) = self.fingerprint(constraint, entity)?;
            debug!(constraint = constraint.name(), %fingerprint, "queueing sentinel delete");
            self.sentinels.delete_async(&fingerprint);
        }
        Ok(())
    }

    /// Synchronously release every sentinel held by the entity's current values.
    pub fn release(&self, entity: &E) -> Result<(), Error> {
        for constraint in self.registry.constraints() {
            let (fingerprint, _) = self.fingerprint(constraint, entity)?;
            self.sentinels.delete(&fingerprint)?;
        }
        Ok(())
    }

    /// Reserve `constraint` for the entity, resolving conflicts.
    ///
    /// Returns the reserved fingerprint. On conflict the resolver, if any, is
    /// given the attempt index and the values from before the first attempt;
    /// the loop then re-reads the entity. Without a resolver, or after
    /// `max_attempts` round trips, the last attempt is reported as a violation.
    pub fn reserve_with_retry(&self, constraint: &Constraint, entity: &mut E) -> Result<String, Error> {
        let resolver = self.registry.resolver(constraint.name()).cloned();
        let max_attempts = self.config.max_attempts.max(1);
        let original = match resolver {
            Some(_) => self.fingerprint(constraint, entity)?.1,
            None => Vec::new(),
        };

        let mut attempt = 0;
        loop {
            let (fingerprint, values) = self.fingerprint(constraint, entity)?;
            if self.sentinels.create_if_absent(&fingerprint)? {
                debug!(constraint = constraint.name(), attempt, %fingerprint, "reserved");
                return Ok(fingerprint);
            }

            attempt += 1;
            match &resolver {
                Some(resolve) if attempt < max_attempts => {
                    debug!(constraint = constraint.name(), attempt, %fingerprint, "conflict, resolving");
                    resolve(entity, attempt - 1, &original)?;
                }
                _ => {
                    warn!(constraint = constraint.name(), attempts = attempt, %fingerprint, "unique constraint violated");
                    return Err(UniqueConstraintViolation {
                        entity: E::KIND.to_string(),
                        constraint: constraint.name().to_string(),
                        values,
                        fingerprint,
                    }
                    .into());
                }
            }
        }
    }

    fn snapshot_fingerprint(&self, constraint: &Constraint, snapshot: &Snapshot) -> Result<String, Error> {
        let (fingerprint, _) = fingerprint::derive(constraint.properties(), |name| {
            snapshot.get(name).cloned().ok_or_else(|| Error::UnknownProperty {
                entity: E::KIND.to_string(),
                property: name.to_string(),
            })
        })?;
        Ok(fingerprint)
    }

    fn release_quietly(&self, fingerprints: &[String]) {
        if fingerprints.is_empty() {
            return;
        }
        if let Err(e) = self.sentinels.delete_multi(fingerprints) {
            warn!(entity = E::KIND, count = fingerprints.len(), error = %e, "failed to release sentinels");
        }
    }

    fn restore_quietly(&self, fingerprints: &[String]) {
        for fingerprint in fingerprints {
            match self.sentinels.create_if_absent(fingerprint) {
                Ok(true) => {}
                Ok(false) => {
                    warn!(entity = E::KIND, %fingerprint, "previous value was taken before it could be restored");
                }
                Err(e) => {
                    warn!(entity = E::KIND, %fingerprint, error = %e, "failed to restore sentinel");
                }
            }
        }
    }
}
