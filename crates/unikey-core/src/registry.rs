//! Unique constraint declarations per entity type.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::entity::Entity;
use crate::error::Error;
use crate::value::Value;

/// Conflict resolver.
///
/// Called with the entity, the zero-based index of the attempt that just
/// collided, and the constrained values as they were before the first attempt.
/// It should write new candidate values into the entity's constrained
/// properties; the engine then retries with whatever the entity now holds.
pub type Resolver<E> = Arc<dyn Fn(&mut E, usize, &[(String, Value)]) -> Result<(), Error> + Send + Sync>;

/// An ordered set of properties whose combined value must be unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    name: String,
    properties: Vec<String>,
}

impl Constraint {
    /// Create a constraint over `properties`, named after them.
    pub fn new(properties: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let properties: Vec<String> = properties.into_iter().map(Into::into).collect();
        Self {
            name: constraint_name(&properties),
            properties,
        }
    }

    /// Constraint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Constrained properties, in fingerprint order.
    pub fn properties(&self) -> &[String] {
        &self.properties
    }
}

/// Name of the constraint over `properties`: lowercase, joined with `_`.
pub fn constraint_name(properties: &[String]) -> String {
    properties.join("_").to_lowercase()
}

/// The unique constraints of one entity type and their resolvers.
pub struct ConstraintRegistry<E: Entity> {
    constraints: Vec<Constraint>,
    resolvers: HashMap<String, Resolver<E>>,
}

impl<E: Entity> ConstraintRegistry<E> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            constraints: Vec::new(),
            resolvers: HashMap::new(),
        }
    }

    /// Declare a unique constraint over `properties`.
    pub fn unique(mut self, properties: impl IntoIterator<Item = impl Into<String>>) -> Result<Self, Error> {
        self.register(Constraint::new(properties))?;
        Ok(self)
    }

    /// Declare a unique constraint with a conflict resolver.
    pub fn unique_with_resolver<F>(
        mut self,
        properties: impl IntoIterator<Item = impl Into<String>>,
        resolver: F,
    ) -> Result<Self, Error>
    where
        F: Fn(&mut E, usize, &[(String, Value)]) -> Result<(), Error> + Send + Sync + 'static,
    {
        let constraint = Constraint::new(properties);
        let name = constraint.name().to_string();
        self.register(constraint)?;
        self.resolvers.insert(name, Arc::new(resolver));
        Ok(self)
    }

    /// Attach or replace the resolver of an already declared constraint.
    pub fn with_resolver<F>(mut self, constraint: &str, resolver: F) -> Result<Self, Error>
    where
        F: Fn(&mut E, usize, &[(String, Value)]) -> Result<(), Error> + Send + Sync + 'static,
    {
        if self.constraint(constraint).is_none() {
            return Err(Error::UnknownConstraint {
                entity: E::KIND.to_string(),
                constraint: constraint.to_string(),
            });
        }
        self.resolvers.insert(constraint.to_string(), Arc::new(resolver));
        Ok(self)
    }

    fn register(&mut self, constraint: Constraint) -> Result<(), Error> {
        if constraint.properties.is_empty() {
            return Err(Error::EmptyConstraint {
                entity: E::KIND.to_string(),
            });
        }
        if let Some(unknown) = constraint
            .properties
            .iter()
            .find(|p| !E::PROPERTIES.contains(&p.as_str()))
        {
            return Err(Error::UnknownProperty {
                entity: E::KIND.to_string(),
                property: unknown.clone(),
            });
        }
        if self.constraint(constraint.name()).is_some() {
            return Err(Error::DuplicateConstraint {
                entity: E::KIND.to_string(),
                constraint: constraint.name,
            });
        }
        self.constraints.push(constraint);
        Ok(())
    }

    /// All constraints, in declaration order.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Look up a constraint by name.
    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name == name)
    }

    /// Resolver registered for a constraint.
    pub fn resolver(&self, name: &str) -> Option<&Resolver<E>> {
        self.resolvers.get(name)
    }

    /// Number of constraints.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Check if no constraints are declared.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

impl<E: Entity> Default for ConstraintRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> fmt::Debug for ConstraintRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut resolvers: Vec<&String> = self.resolvers.keys().collect();
        resolvers.sort();
        f.debug_struct("ConstraintRegistry")
            .field("entity", &E::KIND)
            .field("constraints", &self.constraints)
            .field("resolvers", &resolvers)
            .finish()
    }
}
