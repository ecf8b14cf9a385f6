//! Type descriptors and the registry that memoizes them.
//!
//! # Responsibility
//! - Validate a record declaration once and bind its fields to extractors,
//!   SQL type codes and enum tables.
//! - Hand out one shared descriptor per record type for the registry lifetime.
//!
//! # Invariants
//! - Malformed declarations fail with `MappingError::Configuration` on first
//!   use and are never cached.
//! - Concurrent first builds may race; the cache keeps the first inserted
//!   descriptor and every caller receives that one.
//! - A projection's fields all exist on its entity and its identity is the
//!   field named like the entity's identity.

use crate::mapping::mapper::{RowAccess, RowMapper};
use crate::mapping::params::ParamGenerator;
use crate::mapping::record::{Accessor, FieldDef, Record, SchemaOrigin};
use crate::mapping::types::{Extractor, FieldKind, SqlType, TypeKey, TypeRegistry};
use crate::mapping::value::{EnumTable, FieldValue};
use crate::mapping::{MappingError, MappingResult};
use crate::naming::to_column_name;
use crate::sql::SqlGenerator;
use log::{debug, info};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

static TABLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid table name regex"));

/// Fully resolved mapping of one record field.
pub struct FieldDescriptor<T> {
    name: &'static str,
    column: String,
    type_key: TypeKey,
    nullable: bool,
    identity: bool,
    enum_table: Option<&'static EnumTable>,
    sql_type: SqlType,
    extractor: Extractor,
    accessor: Accessor<T>,
}

impl<T> FieldDescriptor<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn column(&self) -> &str {
        &self.column
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

    pub fn is_enum(&self) -> bool {
        self.enum_table.is_some()
    }

    pub fn enum_table(&self) -> Option<&'static EnumTable> {
        self.enum_table
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    /// Reads this field from `record`.
    pub fn value_of(&self, record: &T) -> FieldValue {
        (self.accessor)(record)
    }

    /// Reads this field from `record` in write form (enums as names).
    pub fn written_value_of(&self, record: &T) -> FieldValue {
        self.value_of(record).into_written()
    }

    /// Extracts this field's column from `row`.
    pub fn extract(&self, row: &dyn RowAccess) -> MappingResult<FieldValue> {
        (self.extractor)(row, &self.column)
    }
}

/// Whether a descriptor maps an entity or a projection of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorOrigin {
    Entity,
    Projection { entity: &'static str },
}

/// Everything needed to read and write one record type.
pub struct TypeDescriptor<T> {
    type_name: &'static str,
    table: &'static str,
    origin: DescriptorOrigin,
    identity: usize,
    fields: Arc<[FieldDescriptor<T>]>,
    mapper: RowMapper<T>,
    params: ParamGenerator<T>,
    sql: SqlGenerator,
}

impl<T: Record> TypeDescriptor<T> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn origin(&self) -> DescriptorOrigin {
        self.origin
    }

    /// All fields in constructor order.
    pub fn fields(&self) -> &[FieldDescriptor<T>] {
        &self.fields
    }

    pub fn identity(&self) -> &FieldDescriptor<T> {
        &self.fields[self.identity]
    }

    pub fn identity_index(&self) -> usize {
        self.identity
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor<T>> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn mapper(&self) -> &RowMapper<T> {
        &self.mapper
    }

    pub fn params(&self) -> &ParamGenerator<T> {
        &self.params
    }

    pub fn sql(&self) -> &SqlGenerator {
        &self.sql
    }

    /// Rebuilds an instance from write-form arguments without the identity
    /// plus an identity sourced elsewhere, e.g. a generated key.
    pub fn rebuild(&self, args: &[FieldValue], id: FieldValue) -> MappingResult<T> {
        let values = self.params.to_constructor_params_with_id(args, id)?;
        self.mapper.construct(values)
    }
}

/// Explicit registry of descriptors and type coercions.
///
/// Construct once at startup and share by reference or `Arc`.
#[derive(Default)]
pub struct MappingRegistry {
    types: TypeRegistry,
    descriptors: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Returns the descriptor of `T`, building it on first use.
    ///
    /// # Errors
    /// - `Configuration` when the declaration of `T` is malformed.
    pub fn describe<T: Record>(&self) -> MappingResult<Arc<TypeDescriptor<T>>> {
        let key = TypeId::of::<T>();
        if let Some(cached) = self.descriptors.read().get(&key) {
            return downcast::<T>(Arc::clone(cached));
        }

        let built: Arc<dyn Any + Send + Sync> = Arc::new(build_descriptor::<T>(&self.types)?);
        let winner = Arc::clone(self.descriptors.write().entry(key).or_insert(built));
        downcast::<T>(winner)
    }

    pub fn is_described<T: Record>(&self) -> bool {
        self.descriptors.read().contains_key(&TypeId::of::<T>())
    }
}

fn downcast<T: Record>(entry: Arc<dyn Any + Send + Sync>) -> MappingResult<Arc<TypeDescriptor<T>>> {
    entry
        .downcast::<TypeDescriptor<T>>()
        .map_err(|_| configuration::<T>("descriptor cache entry has a foreign type".to_string()))
}

fn build_descriptor<T: Record>(types: &TypeRegistry) -> MappingResult<TypeDescriptor<T>> {
    let (type_name, origin, defs) = T::schema().into_parts();

    if defs.len() != T::ARITY {
        return Err(configuration::<T>(format!(
            "declares {} fields but its constructor takes {} values; every constructor value must be a declared field",
            defs.len(),
            T::ARITY
        )));
    }
    ensure_unique_fields::<T>(&defs)?;

    let (table, identity, descriptor_origin) = match origin {
        SchemaOrigin::Entity { table } => {
            validate_table::<T>(type_name, table)?;
            let marked: Vec<&'static str> = defs
                .iter()
                .filter(|def| def.is_identity())
                .map(FieldDef::name)
                .collect();
            let identity = single_identity(type_name, &marked).map_err(configuration::<T>)?;
            let index = position_of(&defs, identity);
            (table, index, DescriptorOrigin::Entity)
        }
        SchemaOrigin::Projection { entity } => {
            let outline = entity.outline();
            let table = outline.table.ok_or_else(|| {
                configuration::<T>(format!(
                    "projection source {} is not an entity",
                    outline.type_name
                ))
            })?;
            validate_table::<T>(outline.type_name, table)?;
            let entity_identity = single_identity(outline.type_name, &outline.identity_fields)
                .map_err(configuration::<T>)?;

            for def in &defs {
                if !outline.fields.contains(&def.name()) {
                    return Err(configuration::<T>(format!(
                        "field `{}` is not found in {}; is this really a projection?",
                        def.name(),
                        outline.type_name
                    )));
                }
            }

            if !defs.iter().any(|def| def.name() == entity_identity) {
                return Err(configuration::<T>(format!(
                    "identity field `{entity_identity}` of {} is not part of the projection",
                    outline.type_name
                )));
            }
            let index = position_of(&defs, entity_identity);
            (
                table,
                index,
                DescriptorOrigin::Projection {
                    entity: outline.type_name,
                },
            )
        }
    };

    let fields: Arc<[FieldDescriptor<T>]> = defs
        .iter()
        .enumerate()
        .map(|(index, def)| resolve_field(types, def, index == identity))
        .collect::<Vec<_>>()
        .into();

    for field in fields.iter() {
        debug!(
            "event=descriptor_field module=mapping type={} field={} column={} sql_type={} enum={}",
            type_name,
            field.name,
            field.column,
            field.sql_type.code(),
            field.is_enum()
        );
    }

    let columns = fields.iter().map(|field| field.column.clone()).collect();
    let names: Arc<[&'static str]> = fields.iter().map(|field| field.name).collect::<Vec<_>>().into();

    info!(
        "event=descriptor_build module=mapping status=ok type={} table={} fields={} identity={} projection={}",
        type_name,
        table,
        fields.len(),
        fields[identity].name,
        matches!(descriptor_origin, DescriptorOrigin::Projection { .. })
    );

    Ok(TypeDescriptor {
        type_name,
        table,
        origin: descriptor_origin,
        identity,
        mapper: RowMapper::new(type_name, Arc::clone(&fields), names),
        params: ParamGenerator::new(type_name, Arc::clone(&fields), identity),
        sql: SqlGenerator::new(table, columns, identity),
        fields,
    })
}

fn resolve_field<T: 'static>(types: &TypeRegistry, def: &FieldDef<T>, identity: bool) -> FieldDescriptor<T> {
    let type_key = def.type_key();
    FieldDescriptor {
        name: def.name(),
        column: to_column_name(def.name()),
        type_key,
        nullable: def.is_nullable(),
        identity,
        enum_table: match type_key.kind() {
            FieldKind::Enum(table) => Some(table),
            _ => None,
        },
        sql_type: types.sql_type_for(&type_key),
        extractor: types.extractor_for(&type_key),
        accessor: def.accessor(),
    }
}

fn validate_table<T>(owner: &str, table: &str) -> MappingResult<()> {
    if table.trim().is_empty() {
        return Err(configuration::<T>(format!("found no table name for {owner}")));
    }
    if !TABLE_NAME_RE.is_match(table) {
        return Err(configuration::<T>(format!(
            "table name `{table}` of {owner} is not a plain SQL identifier"
        )));
    }
    Ok(())
}

fn single_identity(owner: &str, marked: &[&'static str]) -> Result<&'static str, String> {
    match marked {
        [] => Err(format!("found no identity field for {owner}")),
        [identity] => Ok(*identity),
        [first, second, ..] => Err(format!(
            "{owner} marks more than one identity field (`{first}`, `{second}`)"
        )),
    }
}

fn ensure_unique_fields<T>(defs: &[FieldDef<T>]) -> MappingResult<()> {
    let mut columns = HashSet::with_capacity(defs.len());
    for def in defs {
        if !columns.insert(to_column_name(def.name())) {
            return Err(configuration::<T>(format!(
                "field `{}` maps to a column that is already declared",
                def.name()
            )));
        }
    }
    Ok(())
}

fn position_of<T>(defs: &[FieldDef<T>], name: &str) -> usize {
    defs.iter()
        .position(|def| def.name() == name)
        .unwrap_or_default()
}

fn configuration<T>(message: String) -> MappingError {
    MappingError::Configuration {
        type_name: std::any::type_name::<T>()
            .rsplit("::")
            .next()
            .unwrap_or_default(),
        message,
    }
}
