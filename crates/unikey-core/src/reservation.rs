//! Reservation of arbitrary identifiers, singly or as a batch.
//!
//! A batch is all-or-nothing only in effect: keys are created one at a time
//! and, if one is already held, the keys created so far are deleted again.
//! A crash between those two steps leaves the created keys behind as orphaned
//! reservations. A store with real multi-key transactions should wrap the
//! whole batch in one transaction instead.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::Error;
use crate::sentinel::SentinelStore;
use crate::store::KeyedStore;

/// Outcome of a batch reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReservation {
    /// Whether every identifier is now held by the caller.
    pub reserved: bool,
    /// Identifiers that are not held, in request order. Empty on success.
    pub failed: Vec<String>,
}

impl BatchReservation {
    fn success() -> Self {
        Self {
            reserved: true,
            failed: Vec::new(),
        }
    }
}

/// Reserves identifiers within one namespace.
pub struct Reservation<S: KeyedStore + ?Sized> {
    sentinels: SentinelStore<S>,
}

impl<S: KeyedStore + ?Sized> Reservation<S> {
    /// Reservations in namespace `kind`.
    pub fn new(store: Arc<S>, kind: impl Into<String>) -> Self {
        Self {
            sentinels: SentinelStore::new(store, kind),
        }
    }

    /// The namespace.
    pub fn kind(&self) -> &str {
        self.sentinels.kind()
    }

    /// Reserve one identifier. Returns true only if this call took it.
    pub fn reserve(&self, id: &str) -> Result<bool, Error> {
        self.sentinels.create_if_absent(id)
    }

    /// Check whether an identifier is held.
    pub fn is_reserved(&self, id: &str) -> Result<bool, Error> {
        self.sentinels.exists(id)
    }

    /// Reserve every identifier or none of them.
    ///
    /// Identifiers are tried in order. If one is already held, the ones
    /// created before it are released and the result names the held one and
    /// every one after it. Store errors are returned as errors; a held
    /// identifier is not.
    #[instrument(skip_all, fields(kind = %self.sentinels.kind(), count = ids.len()))]
    pub fn reserve_batch<I: AsRef<str>>(&self, ids: &[I]) -> Result<BatchReservation, Error> {
        let requested: Vec<String> = ids.iter().map(|id| id.as_ref().to_string()).collect();
        let created = self.sentinels.create_multi(&requested)?;

        if created.len() == requested.len() {
            debug!("batch reserved");
            return Ok(BatchReservation::success());
        }

        if let Err(e) = self.sentinels.delete_multi(&created) {
            warn!(count = created.len(), error = %e, "rollback of partial batch failed");
        }

        // `created` is a prefix of `requested`.
        let failed = requested[created.len()..].to_vec();
        debug!(failed = failed.len(), "batch rejected");
        Ok(BatchReservation {
            reserved: false,
            failed,
        })
    }

    /// Release identifiers.
    pub fn release<I: AsRef<str>>(&self, ids: &[I]) -> Result<(), Error> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_ref().to_string()).collect();
        self.sentinels.delete_multi(&ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, SledStore, StoreConfig};

    #[test]
    fn test_reserve_single() {
        let tickets = Reservation::new(Arc::new(MemoryStore::new()), "Ticket");
        assert!(tickets.reserve("t-1").unwrap());
        assert!(!tickets.reserve("t-1").unwrap());
        assert!(tickets.is_reserved("t-1").unwrap());
    }

    #[test]
    fn test_batch_success() {
        let tickets = Reservation::new(Arc::new(MemoryStore::new()), "Ticket");
        let outcome = tickets.reserve_batch(&["a", "b", "c"]).unwrap();

        assert_eq!(outcome, BatchReservation { reserved: true, failed: vec![] });
        for id in ["a", "b", "c"] {
            assert!(tickets.is_reserved(id).unwrap());
        }
    }

    #[test]
    fn test_batch_rolls_back_on_conflict() {
        let tickets = Reservation::new(Arc::new(MemoryStore::new()), "Ticket");
        tickets.reserve("b").unwrap();

        let outcome = tickets.reserve_batch(&["a", "b", "c"]).unwrap();

        assert!(!outcome.reserved);
        assert_eq!(outcome.failed, vec!["b", "c"]);
        assert!(!tickets.is_reserved("a").unwrap());
        assert!(tickets.is_reserved("b").unwrap());
        assert!(!tickets.is_reserved("c").unwrap());
    }

    #[test]
    fn test_batch_conflict_on_first() {
        let tickets = Reservation::new(Arc::new(MemoryStore::new()), "Ticket");
        tickets.reserve("a").unwrap();

        let outcome = tickets.reserve_batch(&["a", "b"]).unwrap();
        assert_eq!(outcome.failed, vec!["a", "b"]);
        assert!(!tickets.is_reserved("b").unwrap());
    }

    #[test]
    fn test_empty_batch() {
        let tickets = Reservation::new(Arc::new(MemoryStore::new()), "Ticket");
        let outcome = tickets.reserve_batch::<&str>(&[]).unwrap();
        assert!(outcome.reserved);
    }

    #[test]
    fn test_release() {
        let store = Arc::new(SledStore::open(StoreConfig::temporary()).unwrap());
        let tickets = Reservation::new(store, "Ticket");
        tickets.reserve_batch(&["a", "b"]).unwrap();

        tickets.release(&["a", "b"]).unwrap();

        assert!(tickets.reserve_batch(&["a", "b"]).unwrap().reserved);
    }
}
