//! Positional parameter layouts for write statements.
//!
//! # Responsibility
//! - Flatten one or many records into the positional arrays expected by the
//!   statements of `crate::sql::SqlGenerator`.
//! - Rebuild constructor arguments from written (raw) values.
//!
//! # Invariants
//! - Enum fields are written as their symbolic name.
//! - Batch update arrays have length `(fields - 1) * records * 2 + records`.

use crate::mapping::descriptor::FieldDescriptor;
use crate::mapping::types::FieldKind;
use crate::mapping::value::{EnumValue, FieldValue};
use crate::mapping::{MappingError, MappingResult};
use std::sync::Arc;

/// Builds write parameters for one record type.
pub struct ParamGenerator<T> {
    type_name: &'static str,
    fields: Arc<[FieldDescriptor<T>]>,
    identity: usize,
}

impl<T> ParamGenerator<T> {
    pub(crate) fn new(
        type_name: &'static str,
        fields: Arc<[FieldDescriptor<T>]>,
        identity: usize,
    ) -> Self {
        Self {
            type_name,
            fields,
            identity,
        }
    }

    /// Field values of one record; the identity is left out unless
    /// `with_identity` is set.
    pub fn to_insert_param(&self, record: &T, with_identity: bool) -> Vec<FieldValue> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(index, _)| with_identity || *index != self.identity)
            .map(|(_, field)| field.written_value_of(record))
            .collect()
    }

    /// Insert parameters of every record, concatenated record by record.
    pub fn to_insert_params(&self, records: &[T], with_identity: bool) -> Vec<FieldValue> {
        records
            .iter()
            .flat_map(|record| self.to_insert_param(record, with_identity))
            .collect()
    }

    /// Non-identity fields in declared order, then the identity.
    pub fn to_update_param(&self, record: &T) -> Vec<FieldValue> {
        let mut values = self.to_insert_param(record, false);
        values.push(self.identity_field().written_value_of(record));
        values
    }

    /// Layout for a `CASE <id> WHEN ? THEN ? ... END` batch update: for every
    /// non-identity field, `(id, value)` per record; then all ids.
    pub fn to_update_params(&self, records: &[T]) -> Vec<FieldValue> {
        let ids: Vec<FieldValue> = records
            .iter()
            .map(|record| self.identity_field().written_value_of(record))
            .collect();

        let mut values =
            Vec::with_capacity((self.fields.len() - 1) * records.len() * 2 + records.len());
        for (index, field) in self.fields.iter().enumerate() {
            if index == self.identity {
                continue;
            }
            for (record, id) in records.iter().zip(&ids) {
                values.push(id.clone());
                values.push(field.written_value_of(record));
            }
        }
        values.extend(ids);
        values
    }

    /// # Errors
    /// - `RequiredValue` when the identity is absent.
    pub fn to_delete_by_id_param(&self, record: &T) -> MappingResult<FieldValue> {
        let id = self.identity_field().written_value_of(record);
        if id.is_null() {
            return Err(MappingError::RequiredValue {
                type_name: self.type_name,
                field: self.identity_field().name(),
            });
        }
        Ok(id)
    }

    /// # Errors
    /// - `RequiredValue` when any identity is absent.
    pub fn to_delete_by_ids_param(&self, records: &[T]) -> MappingResult<Vec<FieldValue>> {
        records
            .iter()
            .map(|record| self.to_delete_by_id_param(record))
            .collect()
    }

    /// Rebuilds constructor arguments from written values in field order.
    ///
    /// Enum names are resolved back to variants and integers are narrowed to
    /// the declared width.
    pub fn to_constructor_params(&self, args: &[FieldValue]) -> MappingResult<Vec<FieldValue>> {
        if args.len() != self.fields.len() {
            return Err(MappingError::SchemaMismatch {
                type_name: self.type_name,
                field_count: self.fields.len(),
                column_count: args.len(),
            });
        }
        self.fields
            .iter()
            .zip(args)
            .map(|(field, value)| restore(field, value.clone()))
            .collect()
    }

    /// Like [`ParamGenerator::to_constructor_params`] for values without the
    /// identity, which is supplied separately (e.g. a generated key).
    pub fn to_constructor_params_with_id(
        &self,
        args: &[FieldValue],
        id: FieldValue,
    ) -> MappingResult<Vec<FieldValue>> {
        if args.len() + 1 != self.fields.len() {
            return Err(MappingError::SchemaMismatch {
                type_name: self.type_name,
                field_count: self.fields.len(),
                column_count: args.len() + 1,
            });
        }
        let mut full = Vec::with_capacity(self.fields.len());
        full.extend_from_slice(&args[..self.identity]);
        full.push(id);
        full.extend_from_slice(&args[self.identity..]);
        self.to_constructor_params(&full)
    }

    fn identity_field(&self) -> &FieldDescriptor<T> {
        &self.fields[self.identity]
    }
}

fn restore<T>(field: &FieldDescriptor<T>, value: FieldValue) -> MappingResult<FieldValue> {
    if value.is_null() {
        return Ok(value);
    }
    let invalid = |message: String| MappingError::InvalidValue {
        field: field.name().to_string(),
        message,
    };

    match (field.type_key().kind(), value) {
        (FieldKind::Enum(table), FieldValue::Text(name)) => EnumValue::from_name(table, &name)
            .map(FieldValue::Enum)
            .ok_or_else(|| invalid(format!("`{name}` names no variant of {}", table.type_name))),
        (FieldKind::I8, value) => narrow(value, |n| i8::try_from(n).ok().map(FieldValue::I8))
            .ok_or_else(|| invalid("value does not fit in i8".to_string())),
        (FieldKind::I16, value) => narrow(value, |n| i16::try_from(n).ok().map(FieldValue::I16))
            .ok_or_else(|| invalid("value does not fit in i16".to_string())),
        (FieldKind::I32, value) => narrow(value, |n| i32::try_from(n).ok().map(FieldValue::I32))
            .ok_or_else(|| invalid("value does not fit in i32".to_string())),
        (FieldKind::I64, value) => {
            narrow(value, |n| Some(FieldValue::I64(n))).ok_or_else(|| invalid("not an integer".to_string()))
        }
        (_, value) => Ok(value),
    }
}

fn narrow(value: FieldValue, convert: impl Fn(i64) -> Option<FieldValue>) -> Option<FieldValue> {
    let wide = match value {
        FieldValue::I8(n) => i64::from(n),
        FieldValue::I16(n) => i64::from(n),
        FieldValue::I32(n) => i64::from(n),
        FieldValue::I64(n) => n,
        _ => return None,
    };
    convert(wide)
}
