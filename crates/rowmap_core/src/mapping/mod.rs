//! Record/row mapping layer.
//!
//! # Responsibility
//! - Describe record types once and cache the result per registry.
//! - Coerce stored values into declared field types and back.
//! - Materialize rows into records and records into write parameters.
//!
//! # Invariants
//! - All mapping failures surface as `MappingError`; nothing is defaulted.
//!
//! # See also
//! - `crate::pagination` for the main consumer of descriptors.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod descriptor;
pub mod mapper;
pub mod params;
pub mod record;
pub mod types;
pub mod value;

pub use descriptor::{DescriptorOrigin, FieldDescriptor, MappingRegistry, TypeDescriptor};
pub use mapper::{NamedParam, NamedParams, RowAccess, RowMapper};
pub use params::ParamGenerator;
pub use record::{EntityOutline, FieldDef, FieldValues, Record, RecordSchema, SchemaOrigin};
pub use types::{Extractor, FieldKind, SqlField, SqlType, TypeKey, TypeRegistry};
pub use value::{
    Blob, Clob, Decimal, EnumTable, EnumValue, FieldValue, FromFieldValue, SqlEnum, ToFieldValue,
};

pub type MappingResult<T> = Result<T, MappingError>;

/// Failure while describing, reading or writing a record type.
#[derive(Debug)]
pub enum MappingError {
    /// The record declaration is malformed.
    Configuration {
        type_name: &'static str,
        message: String,
    },
    /// A fetched row does not have one column per field.
    SchemaMismatch {
        type_name: &'static str,
        field_count: usize,
        column_count: usize,
    },
    /// A value that must be present is absent.
    RequiredValue {
        type_name: &'static str,
        field: &'static str,
    },
    /// A stored or supplied value cannot be coerced to the declared type.
    InvalidValue { field: String, message: String },
    Db(DbError),
}

impl Display for MappingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration { type_name, message } => {
                write!(f, "invalid mapping for {type_name}: {message}")
            }
            Self::SchemaMismatch {
                type_name,
                field_count,
                column_count,
            } => write!(
                f,
                "row of {column_count} columns cannot be mapped to {type_name} with {field_count} fields"
            ),
            Self::RequiredValue { type_name, field } => {
                write!(f, "required value {type_name}.{field} is absent")
            }
            Self::InvalidValue { field, message } => {
                write!(f, "invalid value for `{field}`: {message}")
            }
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MappingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Configuration { .. }
            | Self::SchemaMismatch { .. }
            | Self::RequiredValue { .. }
            | Self::InvalidValue { .. } => None,
        }
    }
}

impl From<DbError> for MappingError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for MappingError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
