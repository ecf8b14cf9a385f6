//! Type coercion registry: per-type row extractors and SQL type codes.
//!
//! # Responsibility
//! - Resolve, for every declared field type, how to read it from a row and
//!   which SQL type code to bind it with.
//! - Let callers override either for a given type.
//!
//! # Invariants
//! - A stored NULL always extracts as `FieldValue::Null`, for primitives too.
//! - Lookups are get-or-create; registration replaces the cached entry.
//! - Descriptors built before a registration keep the entries they resolved.

use crate::mapping::mapper::RowAccess;
use crate::mapping::value::{Blob, Clob, Decimal, EnumTable, EnumValue, FieldValue};
use crate::mapping::{MappingError, MappingResult};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::info;
use parking_lot::RwLock;
use rusqlite::types::{FromSql, Value, ValueRef};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Reads one column of a row as a [`FieldValue`].
pub type Extractor = Arc<dyn Fn(&dyn RowAccess, &str) -> MappingResult<FieldValue> + Send + Sync>;

/// Built-in coercion category of a declared field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Decimal,
    Text,
    Clob,
    Bytes,
    Blob,
    Date,
    Time,
    Timestamp,
    Uuid,
    Enum(&'static EnumTable),
    /// No built-in coercion; the raw store value is fetched.
    Other,
}

/// Declared type of a record field.
///
/// `Base` is the type registry entries are keyed by, so `Option<T>` shares
/// the entries of `T`.
pub trait SqlField: 'static {
    type Base: 'static;
    const KIND: FieldKind;
    const NULLABLE: bool = false;
}

impl<T: SqlField> SqlField for Option<T> {
    type Base = T::Base;
    const KIND: FieldKind = T::KIND;
    const NULLABLE: bool = true;
}

macro_rules! sql_fields {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl SqlField for $ty {
                type Base = $ty;
                const KIND: FieldKind = FieldKind::$kind;
            }
        )*
    };
}

sql_fields! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    String => Text,
    Clob => Clob,
    Vec<u8> => Bytes,
    Blob => Blob,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    Uuid => Uuid,
    Value => Other,
}

/// Registry key and coercion category of one declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
    kind: FieldKind,
}

impl TypeKey {
    pub fn of<F: SqlField>() -> Self {
        Self {
            id: TypeId::of::<F::Base>(),
            name: std::any::type_name::<F::Base>(),
            kind: F::KIND,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }
}

/// SQL type codes used for parameter binding metadata.
///
/// Codes follow the JDBC `java.sql.Types` numbering so they stay stable
/// across drivers and tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    Decimal,
    Varchar,
    Clob,
    VarBinary,
    Blob,
    Date,
    Time,
    Timestamp,
    Other,
    Unknown,
}

impl SqlType {
    pub fn code(self) -> i32 {
        match self {
            Self::Boolean => 16,
            Self::TinyInt => -6,
            Self::SmallInt => 5,
            Self::Integer => 4,
            Self::BigInt => -5,
            Self::Float => 6,
            Self::Double => 8,
            Self::Decimal => 3,
            Self::Varchar => 12,
            Self::Clob => 2005,
            Self::VarBinary => -3,
            Self::Blob => 2004,
            Self::Date => 91,
            Self::Time => 92,
            Self::Timestamp => 93,
            Self::Other => 1111,
            Self::Unknown => i32::MIN,
        }
    }

    /// Default code for a coercion category. Enums bind as text.
    pub fn for_kind(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Bool => Self::Boolean,
            FieldKind::I8 => Self::TinyInt,
            FieldKind::I16 => Self::SmallInt,
            FieldKind::I32 => Self::Integer,
            FieldKind::I64 => Self::BigInt,
            FieldKind::F32 => Self::Float,
            FieldKind::F64 => Self::Double,
            FieldKind::Decimal => Self::Decimal,
            FieldKind::Text | FieldKind::Uuid | FieldKind::Enum(_) => Self::Varchar,
            FieldKind::Clob => Self::Clob,
            FieldKind::Bytes => Self::VarBinary,
            FieldKind::Blob => Self::Blob,
            FieldKind::Date => Self::Date,
            FieldKind::Time => Self::Time,
            FieldKind::Timestamp => Self::Timestamp,
            FieldKind::Other => Self::Unknown,
        }
    }
}

/// Process-lifetime cache of extractors and SQL type codes per declared type.
#[derive(Default)]
pub struct TypeRegistry {
    extractors: RwLock<HashMap<TypeId, Extractor>>,
    sql_types: RwLock<HashMap<TypeId, SqlType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the extractor for `key`, creating the built-in one on first use.
    pub fn extractor_for(&self, key: &TypeKey) -> Extractor {
        if let Some(extractor) = self.extractors.read().get(&key.id) {
            return Arc::clone(extractor);
        }
        let built = builtin_extractor(key.kind);
        Arc::clone(self.extractors.write().entry(key.id).or_insert(built))
    }

    /// Returns the SQL type code for `key`, creating the default on first use.
    pub fn sql_type_for(&self, key: &TypeKey) -> SqlType {
        if let Some(sql_type) = self.sql_types.read().get(&key.id) {
            return *sql_type;
        }
        *self
            .sql_types
            .write()
            .entry(key.id)
            .or_insert_with(|| SqlType::for_kind(key.kind))
    }

    /// Overrides how values of type `F` are read from rows.
    pub fn register_extractor<F, E>(&self, extractor: E)
    where
        F: 'static,
        E: Fn(&dyn RowAccess, &str) -> MappingResult<FieldValue> + Send + Sync + 'static,
    {
        self.extractors
            .write()
            .insert(TypeId::of::<F>(), Arc::new(extractor));
        info!(
            "event=type_register module=mapping status=ok target=extractor type={}",
            std::any::type_name::<F>()
        );
    }

    /// Overrides the SQL type code bound for values of type `F`.
    pub fn register_sql_type<F: 'static>(&self, sql_type: SqlType) {
        self.sql_types.write().insert(TypeId::of::<F>(), sql_type);
        info!(
            "event=type_register module=mapping status=ok target=sql_type type={} code={}",
            std::any::type_name::<F>(),
            sql_type.code()
        );
    }
}

fn builtin_extractor(kind: FieldKind) -> Extractor {
    match kind {
        FieldKind::Bool => typed::<bool>(FieldValue::Bool),
        FieldKind::I8 => typed::<i8>(FieldValue::I8),
        FieldKind::I16 => typed::<i16>(FieldValue::I16),
        FieldKind::I32 => typed::<i32>(FieldValue::I32),
        FieldKind::I64 => typed::<i64>(FieldValue::I64),
        FieldKind::F32 => typed::<f32>(FieldValue::F32),
        FieldKind::F64 => typed::<f64>(FieldValue::F64),
        FieldKind::Text => typed::<String>(FieldValue::Text),
        FieldKind::Clob => typed::<String>(FieldValue::Clob),
        FieldKind::Bytes => typed::<Vec<u8>>(FieldValue::Bytes),
        FieldKind::Blob => typed::<Vec<u8>>(FieldValue::Blob),
        FieldKind::Date => typed::<NaiveDate>(FieldValue::Date),
        FieldKind::Time => typed::<NaiveTime>(FieldValue::Time),
        FieldKind::Timestamp => typed::<NaiveDateTime>(FieldValue::Timestamp),
        FieldKind::Decimal => Arc::new(extract_decimal),
        FieldKind::Uuid => Arc::new(extract_uuid),
        FieldKind::Enum(table) => Arc::new(move |row: &dyn RowAccess, column: &str| {
            extract_enum(table, row, column)
        }),
        FieldKind::Other => Arc::new(|row: &dyn RowAccess, column: &str| {
            let value = row.value(column)?;
            Ok(match value {
                Value::Null => FieldValue::Null,
                other => FieldValue::Other(other),
            })
        }),
    }
}

fn typed<T: FromSql + 'static>(wrap: fn(T) -> FieldValue) -> Extractor {
    Arc::new(move |row: &dyn RowAccess, column: &str| {
        let value = row.value(column)?;
        if matches!(value, Value::Null) {
            return Ok(FieldValue::Null);
        }
        T::column_result(ValueRef::from(&value))
            .map(wrap)
            .map_err(|err| invalid(column, err.to_string()))
    })
}

fn extract_decimal(row: &dyn RowAccess, column: &str) -> MappingResult<FieldValue> {
    let text = match row.value(column)? {
        Value::Null => return Ok(FieldValue::Null),
        Value::Integer(value) => value.to_string(),
        Value::Real(value) => value.to_string(),
        Value::Text(value) => value,
        Value::Blob(_) => return Err(invalid(column, "blob cannot be read as decimal")),
    };
    Decimal::parse(&text)
        .map(FieldValue::Decimal)
        .ok_or_else(|| invalid(column, format!("`{text}` is not a decimal")))
}

fn extract_uuid(row: &dyn RowAccess, column: &str) -> MappingResult<FieldValue> {
    match row.value(column)? {
        Value::Null => Ok(FieldValue::Null),
        Value::Text(text) => Uuid::parse_str(&text)
            .map(FieldValue::Uuid)
            .map_err(|_| invalid(column, format!("invalid uuid value `{text}`"))),
        Value::Blob(bytes) => Uuid::from_slice(&bytes)
            .map(FieldValue::Uuid)
            .map_err(|err| invalid(column, err.to_string())),
        other => Err(invalid(
            column,
            format!("{:?} cannot be read as uuid", other.data_type()),
        )),
    }
}

/// Resolution order: symbolic name, then ordinal for numbers (including
/// numeric text left behind by column affinity), then the value's text form
/// as a name.
fn extract_enum(
    table: &'static EnumTable,
    row: &dyn RowAccess,
    column: &str,
) -> MappingResult<FieldValue> {
    let resolved = match row.value(column)? {
        Value::Null => return Ok(FieldValue::Null),
        Value::Text(text) => EnumValue::from_name(table, &text)
            .or_else(|| {
                text.trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(|number| by_ordinal(table, number))
            })
            .ok_or(text),
        Value::Integer(ordinal) => usize::try_from(ordinal)
            .ok()
            .and_then(|ordinal| EnumValue::from_ordinal(table, ordinal))
            .ok_or_else(|| ordinal.to_string()),
        Value::Real(number) => by_ordinal(table, number).ok_or_else(|| number.to_string()),
        Value::Blob(bytes) => {
            let name = String::from_utf8_lossy(&bytes).into_owned();
            EnumValue::from_name(table, &name).ok_or(name)
        }
    };

    resolved.map(FieldValue::Enum).map_err(|stored| {
        invalid(
            column,
            format!("`{stored}` names no variant of {}", table.type_name),
        )
    })
}

fn by_ordinal(table: &'static EnumTable, number: f64) -> Option<EnumValue> {
    let truncated = number.trunc();
    if truncated >= 0.0 && truncated < table.len() as f64 {
        EnumValue::from_ordinal(table, truncated as usize)
    } else {
        None
    }
}

fn invalid(column: &str, message: impl Into<String>) -> MappingError {
    MappingError::InvalidValue {
        field: column.to_string(),
        message: message.into(),
    }
}
