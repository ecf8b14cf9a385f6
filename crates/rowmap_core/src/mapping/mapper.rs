//! Row materialization and named parameter bags.
//!
//! # Responsibility
//! - Turn one fetched row into one record through its descriptor.
//! - Turn one record into a named parameter bag for single-row writes.
//!
//! # Invariants
//! - A row must have exactly as many columns as the record has fields;
//!   anything else is a `SchemaMismatch`, never a best-effort mapping.
//! - Columns are looked up by derived column name, not by position.

use crate::mapping::descriptor::FieldDescriptor;
use crate::mapping::record::{FieldValues, Record};
use crate::mapping::types::SqlType;
use crate::mapping::value::FieldValue;
use crate::mapping::{MappingError, MappingResult};
use rusqlite::types::Value;
use rusqlite::Row;
use std::sync::Arc;

/// Read access to one fetched row.
pub trait RowAccess {
    fn column_count(&self) -> usize;

    /// Returns the stored value of the named column.
    fn value(&self, column: &str) -> MappingResult<Value>;
}

impl RowAccess for Row<'_> {
    fn column_count(&self) -> usize {
        self.as_ref().column_count()
    }

    fn value(&self, column: &str) -> MappingResult<Value> {
        Ok(self.get::<_, Value>(column)?)
    }
}

/// Maps rows of one record type.
pub struct RowMapper<T> {
    type_name: &'static str,
    fields: Arc<[FieldDescriptor<T>]>,
    names: Arc<[&'static str]>,
}

impl<T: Record> RowMapper<T> {
    pub(crate) fn new(
        type_name: &'static str,
        fields: Arc<[FieldDescriptor<T>]>,
        names: Arc<[&'static str]>,
    ) -> Self {
        Self {
            type_name,
            fields,
            names,
        }
    }

    /// Materializes one record from `row`.
    ///
    /// # Errors
    /// - `SchemaMismatch` when the column count differs from the field count.
    /// - Extraction and constructor errors of individual fields.
    pub fn map_row(&self, row: &dyn RowAccess) -> MappingResult<T> {
        let column_count = row.column_count();
        if column_count != self.fields.len() {
            return Err(MappingError::SchemaMismatch {
                type_name: self.type_name,
                field_count: self.fields.len(),
                column_count,
            });
        }

        let values = self
            .fields
            .iter()
            .map(|field| field.extract(row))
            .collect::<MappingResult<Vec<_>>>()?;
        self.construct(values)
    }

    /// Runs the canonical constructor on values in field order.
    pub fn construct(&self, values: Vec<FieldValue>) -> MappingResult<T> {
        let mut values = FieldValues::new(self.type_name, Arc::clone(&self.names), values);
        T::from_values(&mut values)
    }

    /// Builds the named parameter bag of `record`, keyed by field name.
    pub fn parameter_source(&self, record: &T) -> NamedParams {
        let mut params = NamedParams::with_capacity(self.fields.len());
        for field in self.fields.iter() {
            params.add_typed(
                field.name(),
                field.written_value_of(record),
                field.sql_type(),
                field.type_key().name(),
            );
        }
        params
    }
}

/// One entry of a [`NamedParams`] bag.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedParam {
    name: String,
    value: FieldValue,
    sql_type: SqlType,
    type_name: Option<&'static str>,
}

impl NamedParam {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    pub fn type_name(&self) -> Option<&'static str> {
        self.type_name
    }
}

/// Ordered named parameters with SQL type metadata.
///
/// Adding a name that is already present replaces its entry in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedParams {
    entries: Vec<NamedParam>,
}

impl NamedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Builder form of [`NamedParams::add_value`].
    pub fn with_value(
        mut self,
        name: impl Into<String>,
        value: FieldValue,
        sql_type: SqlType,
    ) -> Self {
        self.add_value(name, value, sql_type);
        self
    }

    pub fn add_value(
        &mut self,
        name: impl Into<String>,
        value: FieldValue,
        sql_type: SqlType,
    ) -> &mut Self {
        self.insert(NamedParam {
            name: name.into(),
            value,
            sql_type,
            type_name: None,
        })
    }

    pub fn add_typed(
        &mut self,
        name: impl Into<String>,
        value: FieldValue,
        sql_type: SqlType,
        type_name: &'static str,
    ) -> &mut Self {
        self.insert(NamedParam {
            name: name.into(),
            value,
            sql_type,
            type_name: Some(type_name),
        })
    }

    /// Copies every entry of `other` into this bag, replacing equal names.
    pub fn merge(&mut self, other: &NamedParams) -> &mut Self {
        for entry in &other.entries {
            self.insert(entry.clone());
        }
        self
    }

    pub fn has_value(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.entry(name).map(NamedParam::value)
    }

    /// SQL type code of `name`, `SqlType::Unknown` when absent.
    pub fn sql_type(&self, name: &str) -> SqlType {
        self.entry(name)
            .map_or(SqlType::Unknown, NamedParam::sql_type)
    }

    pub fn type_name(&self, name: &str) -> Option<&'static str> {
        self.entry(name).and_then(NamedParam::type_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(NamedParam::name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedParam> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Option<&NamedParam> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    fn insert(&mut self, param: NamedParam) -> &mut Self {
        match self.entries.iter_mut().find(|entry| entry.name == param.name) {
            Some(existing) => *existing = param,
            None => self.entries.push(param),
        }
        self
    }
}
