//! unikey core - unique constraints on a keyed store.
//!
//! The store only has to offer atomic create-if-absent on a single key. For
//! every unique constraint an entity type declares, the value combination is
//! hashed into a fingerprint and a sentinel record is created under it. The
//! first writer to create the sentinel holds the combination; everyone else
//! gets a [`UniqueConstraintViolation`] or goes through the constraint's
//! resolver.
//!
//! There is no multi-key atomicity. Moving a reservation on update, and
//! rolling back a partial batch, are sequences of single-key operations.

pub mod enforcer;
pub mod entity;
pub mod error;
pub mod fingerprint;
pub mod registry;
pub mod repository;
pub mod reservation;
pub mod sentinel;
pub mod store;
pub mod value;

pub use enforcer::{ConstraintEnforcer, EnforcerConfig, DEFAULT_MAX_ATTEMPTS};
pub use entity::{Entity, Snapshot};
pub use error::{Error, UniqueConstraintViolation};
pub use registry::{Constraint, ConstraintRegistry, Resolver};
pub use repository::{Loaded, Repository};
pub use reservation::{BatchReservation, Reservation};
pub use sentinel::{Sentinel, SentinelStore};
pub use store::{KeyedStore, MemoryStore, ReaperConfig, SledStore, StoreConfig, StoreKey};
pub use value::Value;
