//! Entity access used by the constraint engine.

use std::collections::HashMap;

use crate::error::Error;
use crate::value::Value;

/// A persistable record with named properties.
///
/// The engine reads and writes properties by name and never looks at the
/// concrete type, so any struct can take part by implementing this trait.
pub trait Entity {
    /// Entity type name. Used as the store namespace for records, and as the
    /// prefix of the sentinel namespace (`<KIND>Unique`).
    const KIND: &'static str;

    /// Every property name, in declaration order.
    const PROPERTIES: &'static [&'static str];

    /// Primary key, once assigned.
    fn id(&self) -> Option<u64>;

    /// Assign the primary key.
    fn set_id(&mut self, id: u64);

    /// Read a property. Returns `None` for names the type does not declare.
    fn property(&self, name: &str) -> Option<Value>;

    /// Write a property.
    fn set_property(&mut self, name: &str, value: Value) -> Result<(), Error>;
}

/// Read a property, failing for names the type does not declare.
pub fn read_property<E: Entity>(entity: &E, name: &str) -> Result<Value, Error> {
    entity.property(name).ok_or_else(|| Error::UnknownProperty {
        entity: E::KIND.to_string(),
        property: name.to_string(),
    })
}

/// Error for a `set_property` call with a mismatched value type.
pub fn invalid_property<E: Entity>(name: &str, value: &Value, expected: &str) -> Error {
    Error::InvalidProperty {
        entity: E::KIND.to_string(),
        property: name.to_string(),
        reason: format!("expected {expected}, got {}", value.type_name()),
    }
}

/// Property values as loaded from storage, before any caller mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    values: HashMap<String, Value>,
}

impl Snapshot {
    /// Capture every declared property of `entity`.
    pub fn capture<E: Entity>(entity: &E) -> Self {
        let values = E::PROPERTIES
            .iter()
            .filter_map(|name| entity.property(name).map(|v| (name.to_string(), v)))
            .collect();
        Self { values }
    }

    /// Captured value of a property.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Check whether any of `properties` differs between the snapshot and `entity`.
    pub fn changed<E: Entity>(&self, entity: &E, properties: &[String]) -> bool {
        properties
            .iter()
            .any(|name| self.values.get(name.as_str()) != entity.property(name).as_ref())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use serde::{Deserialize, Serialize};

    use super::*;

    /// Small entity used across the crate's unit tests.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Account {
        pub id: Option<u64>,
        pub org: String,
        pub email: String,
        pub handle: String,
    }

    impl Account {
        pub fn new(org: &str, email: &str, handle: &str) -> Self {
            Self {
                id: None,
                org: org.to_string(),
                email: email.to_string(),
                handle: handle.to_string(),
            }
        }
    }

    impl Entity for Account {
        const KIND: &'static str = "Account";
        const PROPERTIES: &'static [&'static str] = &["org", "email", "handle"];

        fn id(&self) -> Option<u64> {
            self.id
        }

        fn set_id(&mut self, id: u64) {
            self.id = Some(id);
        }

        fn property(&self, name: &str) -> Option<Value> {
            match name {
                "org" => Some(Value::from(self.org.as_str())),
                "email" => Some(Value::from(self.email.as_str())),
                "handle" => Some(Value::from(self.handle.as_str())),
                _ => None,
            }
        }

        fn set_property(&mut self, name: &str, value: Value) -> Result<(), Error> {
            let text = value
                .as_str()
                .ok_or_else(|| invalid_property::<Self>(name, &value, "string"))?
                .to_string();
            match name {
                "org" => self.org = text,
                "email" => self.email = text,
                "handle" => self.handle = text,
                _ => {
                    return Err(Error::UnknownProperty {
                        entity: Self::KIND.to_string(),
                        property: name.to_string(),
                    })
                }
            }
            Ok(())
        }
    }
}
