//! Entity metadata: the name → typed accessor lookup tables.
//!
//! Every entity type exposes a static [`EntityMetadata`] listing its
//! properties in declaration order. Tables are either written by hand with
//! the builder or generated by `#[derive(Entity)]`.
//!
//! ```rust
//! use std::sync::OnceLock;
//! use sift_query::entity::{Entity, EntityMetadata};
//!
//! struct Permission {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Entity for Permission {
//!     fn metadata() -> &'static EntityMetadata<Self> {
//!         static METADATA: OnceLock<EntityMetadata<Permission>> = OnceLock::new();
//!         METADATA.get_or_init(|| {
//!             EntityMetadata::builder("Permission")
//!                 .field("Id", |p: &Permission| &p.id)
//!                 .field("Name", |p: &Permission| &p.name)
//!                 .build()
//!         })
//!     }
//! }
//!
//! let property = Permission::metadata().resolve_property("Name").unwrap();
//! assert_eq!(property.ty().family, sift_query::TypeFamily::String);
//! assert!(Permission::metadata().resolve_property("name").is_err());
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{QueryError, QueryResult};
use crate::value::{PropertyType, PropertyValue, Value};

/// A type whose properties can be filtered and sorted by name.
pub trait Entity: Any + Send + Sync + Sized {
    /// The metadata table for this type.
    fn metadata() -> &'static EntityMetadata<Self>;
}

type Accessor<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;

/// A named, typed accessor on entity `T`.
pub struct Property<T> {
    name: &'static str,
    ty: PropertyType,
    accessor: Accessor<T>,
}

impl<T> Property<T> {
    /// Property name, as matched against requests (case-sensitive).
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Resolved property type.
    pub fn ty(&self) -> PropertyType {
        self.ty
    }

    /// Read the property from an entity.
    pub fn get(&self, entity: &T) -> Value {
        (self.accessor)(entity)
    }

    pub(crate) fn accessor(&self) -> Accessor<T> {
        Arc::clone(&self.accessor)
    }
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            ty: self.ty,
            accessor: Arc::clone(&self.accessor),
        }
    }
}

impl<T> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .finish()
    }
}

/// The property table of entity `T`.
pub struct EntityMetadata<T> {
    name: &'static str,
    properties: IndexMap<&'static str, Property<T>>,
}

impl<T: 'static> EntityMetadata<T> {
    /// Start building metadata for an entity called `name`.
    pub fn builder(name: &'static str) -> EntityMetadataBuilder<T> {
        EntityMetadataBuilder {
            name,
            properties: IndexMap::new(),
        }
    }

    /// Entity name used in messages and rendered trees.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Look up a property by its exact name.
    pub fn property(&self, name: &str) -> Option<&Property<T>> {
        self.properties.get(name)
    }

    /// Look up a property, failing with `PropertyNotFound`.
    pub fn resolve_property(&self, name: &str) -> QueryResult<&Property<T>> {
        self.properties.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.properties.keys().copied().collect();
            QueryError::property_not_found(self.name, name, &known)
        })
    }

    /// Properties in declaration order.
    pub fn properties(&self) -> impl Iterator<Item = &Property<T>> {
        self.properties.values()
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the entity has no properties.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl<T> fmt::Debug for EntityMetadata<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMetadata")
            .field("name", &self.name)
            .field("properties", &self.properties.values().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`EntityMetadata`].
pub struct EntityMetadataBuilder<T> {
    name: &'static str,
    properties: IndexMap<&'static str, Property<T>>,
}

impl<T: 'static> EntityMetadataBuilder<T> {
    /// Register a stored field. The type is taken from its [`PropertyValue`] impl.
    ///
    /// Registering a name twice replaces the earlier property in place.
    pub fn field<V, F>(self, name: &'static str, get: F) -> Self
    where
        V: PropertyValue + ?Sized,
        F: Fn(&T) -> &V + Send + Sync + 'static,
    {
        self.computed(name, V::TYPE, move |entity| get(entity).to_value())
    }

    /// Register a computed property with an explicit type.
    pub fn computed<F>(mut self, name: &'static str, ty: PropertyType, get: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        self.properties.insert(
            name,
            Property {
                name,
                ty,
                accessor: Arc::new(get),
            },
        );
        self
    }

    /// Finish the table.
    pub fn build(self) -> EntityMetadata<T> {
        EntityMetadata {
            name: self.name,
            properties: self.properties,
        }
    }
}
