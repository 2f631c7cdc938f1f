//! Core error types.

use std::fmt;

use thiserror::Error;

use crate::value::Value;

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// A single-key transaction failed for a reason other than a conflict.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Key decoding error.
    #[error("invalid key format")]
    InvalidKey,

    /// A unique constraint could not be satisfied.
    #[error(transparent)]
    UniqueViolation(#[from] UniqueConstraintViolation),

    /// A constraint or lookup named a property the entity type does not declare.
    #[error("entity {entity} has no property {property:?}")]
    UnknownProperty {
        /// Entity kind.
        entity: String,
        /// Property name.
        property: String,
    },

    /// A property was assigned a value of the wrong type.
    #[error("invalid value for {entity}.{property}: {reason}")]
    InvalidProperty {
        /// Entity kind.
        entity: String,
        /// Property name.
        property: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A constraint with the same name is already registered.
    #[error("constraint {constraint:?} already registered on {entity}")]
    DuplicateConstraint {
        /// Entity kind.
        entity: String,
        /// Constraint name.
        constraint: String,
    },

    /// A constraint was declared without properties.
    #[error("unique constraint on {entity} must name at least one property")]
    EmptyConstraint {
        /// Entity kind.
        entity: String,
    },

    /// A resolver was attached to a constraint that does not exist.
    #[error("no constraint {constraint:?} on {entity}")]
    UnknownConstraint {
        /// Entity kind.
        entity: String,
        /// Constraint name.
        constraint: String,
    },

    /// A record with this identity already exists.
    #[error("{entity} {id} already exists")]
    AlreadyExists {
        /// Entity kind.
        entity: String,
        /// Identity.
        id: u64,
    },

    /// The entity was expected to have an identity.
    #[error("{entity} has no identity")]
    MissingIdentity {
        /// Entity kind.
        entity: String,
    },

    /// Queued deletes did not apply within the flush timeout.
    #[error("flush timed out with {pending} queued deletes still pending")]
    FlushTimeout {
        /// Deletes queued or in flight when the timeout passed.
        pending: usize,
    },
}

/// Raised when a value combination is already held and could not be resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueConstraintViolation {
    /// Entity kind the constraint belongs to.
    pub entity: String,
    /// Constraint name.
    pub constraint: String,
    /// The (property, value) pairs of the last attempt.
    pub values: Vec<(String, Value)>,
    /// The fingerprint that could not be reserved.
    pub fingerprint: String,
}

impl fmt::Display for UniqueConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unique constraint {} on {} violated for values=[",
            self.constraint, self.entity
        )?;
        for (i, (property, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", property, value)?;
        }
        write!(f, "] ({})", self.fingerprint)
    }
}

impl std::error::Error for UniqueConstraintViolation {}

impl Error {
    /// Returns the violation if this error is a unique constraint violation.
    pub fn as_violation(&self) -> Option<&UniqueConstraintViolation> {
        match self {
            Error::UniqueViolation(v) => Some(v),
            _ => None,
        }
    }
}
