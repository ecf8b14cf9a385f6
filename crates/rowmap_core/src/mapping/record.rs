//! Explicit record declarations.
//!
//! # Responsibility
//! - Let a record type declare its table or projection source, its fields in
//!   constructor order, their accessors and its identity field.
//! - Feed extracted values back into the record's canonical constructor.
//!
//! # Invariants
//! - Field order in `RecordSchema` is the constructor argument order.
//! - `Record::ARITY` is the number of arguments `from_values` consumes.

use crate::mapping::types::{SqlField, TypeKey};
use crate::mapping::value::{FieldValue, FromFieldValue, ToFieldValue};
use crate::mapping::{MappingError, MappingResult};
use std::sync::Arc;

/// Reads one field of a record as a [`FieldValue`].
pub type Accessor<T> = Arc<dyn Fn(&T) -> FieldValue + Send + Sync>;

/// A record type mapped to rows of a table.
///
/// # Example
/// ```ignore
/// impl Record for Design {
///     const ARITY: usize = 2;
///
///     fn schema() -> RecordSchema<Self> {
///         RecordSchema::entity("designs")
///             .field(FieldDef::id("id", |d: &Design| &d.id))
///             .field(FieldDef::new("mainColor", |d: &Design| &d.main_color))
///     }
///
///     fn from_values(values: &mut FieldValues) -> MappingResult<Self> {
///         Ok(Self { id: values.next()?, main_color: values.next()? })
///     }
/// }
/// ```
pub trait Record: Sized + Send + 'static {
    /// Number of parameters of the canonical constructor.
    const ARITY: usize;

    fn schema() -> RecordSchema<Self>;

    /// Canonical constructor; consumes values in declared field order.
    fn from_values(values: &mut FieldValues) -> MappingResult<Self>;
}

/// One declared field of a record.
pub struct FieldDef<T> {
    name: &'static str,
    type_key: TypeKey,
    nullable: bool,
    identity: bool,
    accessor: Accessor<T>,
}

impl<T: 'static> FieldDef<T> {
    pub fn new<F>(name: &'static str, get: fn(&T) -> &F) -> Self
    where
        F: SqlField + ToFieldValue,
    {
        Self {
            name,
            type_key: TypeKey::of::<F>(),
            nullable: F::NULLABLE,
            identity: false,
            accessor: Arc::new(move |record: &T| get(record).to_field_value()),
        }
    }

    /// Declares the identity field of an entity.
    pub fn id<F>(name: &'static str, get: fn(&T) -> &F) -> Self
    where
        F: SqlField + ToFieldValue,
    {
        Self {
            identity: true,
            ..Self::new(name, get)
        }
    }
}

impl<T> FieldDef<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    pub(crate) fn accessor(&self) -> Accessor<T> {
        Arc::clone(&self.accessor)
    }
}

/// Where a record's rows come from.
pub enum SchemaOrigin {
    Entity { table: &'static str },
    Projection { entity: EntityLink },
}

/// Back-reference from a projection to its entity type.
pub struct EntityLink {
    outline: fn() -> EntityOutline,
}

impl EntityLink {
    pub fn outline(&self) -> EntityOutline {
        (self.outline)()
    }
}

/// Type-erased summary of a schema, used to validate projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityOutline {
    pub type_name: &'static str,
    pub table: Option<&'static str>,
    pub fields: Vec<&'static str>,
    pub identity_fields: Vec<&'static str>,
}

/// Declared shape of a record type.
pub struct RecordSchema<T> {
    type_name: &'static str,
    origin: SchemaOrigin,
    fields: Vec<FieldDef<T>>,
}

impl<T: 'static> RecordSchema<T> {
    /// Schema of an entity stored in `table`.
    pub fn entity(table: &'static str) -> Self {
        Self {
            type_name: short_type_name::<T>(),
            origin: SchemaOrigin::Entity { table },
            fields: Vec::new(),
        }
    }

    /// Schema of a projection: a subset of the fields of entity `E`.
    pub fn projection_of<E: Record>() -> Self {
        Self {
            type_name: short_type_name::<T>(),
            origin: SchemaOrigin::Projection {
                entity: EntityLink {
                    outline: outline_of::<E>,
                },
            },
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef<T>) -> Self {
        self.fields.push(field);
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn origin(&self) -> &SchemaOrigin {
        &self.origin
    }

    pub fn fields(&self) -> &[FieldDef<T>] {
        &self.fields
    }

    pub fn outline(&self) -> EntityOutline {
        EntityOutline {
            type_name: self.type_name,
            table: match &self.origin {
                SchemaOrigin::Entity { table } => Some(*table),
                SchemaOrigin::Projection { .. } => None,
            },
            fields: self.fields.iter().map(FieldDef::name).collect(),
            identity_fields: self
                .fields
                .iter()
                .filter(|field| field.is_identity())
                .map(FieldDef::name)
                .collect(),
        }
    }

    pub(crate) fn into_parts(self) -> (&'static str, SchemaOrigin, Vec<FieldDef<T>>) {
        (self.type_name, self.origin, self.fields)
    }
}

fn outline_of<E: Record>() -> EntityOutline {
    E::schema().outline()
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Constructor arguments handed to [`Record::from_values`], in field order.
pub struct FieldValues {
    type_name: &'static str,
    names: Arc<[&'static str]>,
    values: std::vec::IntoIter<FieldValue>,
    position: usize,
}

impl FieldValues {
    pub fn new(type_name: &'static str, names: Arc<[&'static str]>, values: Vec<FieldValue>) -> Self {
        Self {
            type_name,
            names,
            values: values.into_iter(),
            position: 0,
        }
    }

    /// Takes the next constructor argument.
    ///
    /// # Errors
    /// - `RequiredValue` when the value is absent and `F` is not an `Option`.
    /// - `InvalidValue` when arguments ran out or the value has another type.
    pub fn next<F: FromFieldValue>(&mut self) -> MappingResult<F> {
        let field = self.names.get(self.position).copied().unwrap_or("?");
        self.position += 1;

        let value = self
            .values
            .next()
            .ok_or_else(|| MappingError::InvalidValue {
                field: field.to_string(),
                message: format!("{} constructor argument is missing", self.type_name),
            })?;

        F::from_field_value(value).map_err(|rejected| {
            if rejected.is_null() {
                MappingError::RequiredValue {
                    type_name: self.type_name,
                    field,
                }
            } else {
                MappingError::InvalidValue {
                    field: field.to_string(),
                    message: format!(
                        "expected {} but found {}",
                        std::any::type_name::<F>(),
                        rejected.kind_name()
                    ),
                }
            }
        })
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}
