//! SQLite-backed entity store.
//!
//! # Responsibility
//! - Run generated CRUD statements with parameters laid out by the
//!   record's `ParamGenerator`.
//! - Run caller SQL with named parameters and map rows into records.
//!
//! # Invariants
//! - Read-only stores reject every write before touching the connection.
//! - The connection is used by one statement at a time.

use super::{QueryExecutor, StoreError, StoreResult};
use crate::config::StoreConfig;
use crate::db::open_db;
use crate::mapping::{
    FieldValue, MappingRegistry, NamedParams, Record, ToFieldValue, TypeDescriptor,
};
use crate::stream::Chunked;
use log::{error, info};
use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection, Statement};
use std::sync::Arc;
use std::time::Instant;

/// Entity store over one SQLite connection.
pub struct SqliteEntityStore {
    conn: Mutex<Connection>,
    registry: Arc<MappingRegistry>,
    read_only: bool,
}

impl std::fmt::Debug for SqliteEntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEntityStore")
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl SqliteEntityStore {
    /// Opens the configured database with a fresh mapping registry.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let conn = open_db(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            registry: Arc::new(MappingRegistry::new()),
            read_only: config.read_only,
        })
    }

    /// Wraps an already configured connection.
    pub fn new(conn: Connection) -> Self {
        Self::with_registry(conn, Arc::new(MappingRegistry::new()))
    }

    /// Wraps a connection and shares an existing mapping registry.
    pub fn with_registry(conn: Connection, registry: Arc<MappingRegistry>) -> Self {
        Self {
            conn: Mutex::new(conn),
            registry,
            read_only: false,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn shared_registry(&self) -> Arc<MappingRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn describe<T: Record>(&self) -> StoreResult<Arc<TypeDescriptor<T>>> {
        Ok(self.registry.describe::<T>()?)
    }

    pub fn find_all<T: Record>(&self) -> StoreResult<Vec<T>> {
        let descriptor = self.describe::<T>()?;
        self.query_records(&descriptor, &descriptor.sql().select_all(), &NamedParams::new())
    }

    pub fn find_by_id<T: Record>(&self, id: impl ToFieldValue) -> StoreResult<Option<T>> {
        let descriptor = self.describe::<T>()?;
        let id = id.to_field_value().into_written();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&descriptor.sql().select_by_id())?;
        let mut rows = stmt.query(params_from_iter(std::iter::once(&id)))?;
        let found = match rows.next()? {
            Some(row) => Some(descriptor.mapper().map_row(row)?),
            None => None,
        };
        Ok(found)
    }

    /// Runs caller SQL with named parameters (`:name`, `@name` or `$name`).
    pub fn find_by_sql<T: Record>(&self, sql: &str, params: &NamedParams) -> StoreResult<Vec<T>> {
        let descriptor = self.describe::<T>()?;
        self.query_records(&descriptor, sql, params)
    }

    /// Inserts `record` including its identity value.
    pub fn insert<T: Record>(&self, record: &T) -> StoreResult<usize> {
        let descriptor = self.describe::<T>()?;
        let values = descriptor.params().to_insert_param(record, true);
        self.write(descriptor.type_name(), "insert", &descriptor.sql().insert(true), &values)
    }

    /// Inserts `record` without its identity and returns it rebuilt with the
    /// key generated by the database.
    pub fn insert_generated<T: Record>(&self, record: &T) -> StoreResult<T> {
        let descriptor = self.describe::<T>()?;
        let values = descriptor.params().to_insert_param(record, false);
        let sql = descriptor.sql().insert(false);

        self.ensure_writable()?;
        let conn = self.conn.lock();
        conn.execute(&sql, params_from_iter(values.iter()))?;
        let generated = conn.last_insert_rowid();
        drop(conn);

        info!(
            "event=store_write module=store status=ok op=insert_generated type={} rows=1",
            descriptor.type_name()
        );
        Ok(descriptor.rebuild(&values, FieldValue::I64(generated))?)
    }

    /// Inserts every record with one multi-row statement.
    pub fn insert_all<T: Record>(&self, records: &[T]) -> StoreResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let descriptor = self.describe::<T>()?;
        let values = descriptor.params().to_insert_params(records, true);
        let sql = descriptor.sql().insert_batch(records.len(), true);
        self.write(descriptor.type_name(), "insert_all", &sql, &values)
    }

    pub fn update<T: Record>(&self, record: &T) -> StoreResult<usize> {
        let descriptor = self.describe::<T>()?;
        let values = descriptor.params().to_update_param(record);
        self.write(descriptor.type_name(), "update", &descriptor.sql().update(), &values)
    }

    /// Updates every record with one `CASE`-keyed statement.
    pub fn update_all<T: Record>(&self, records: &[T]) -> StoreResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let descriptor = self.describe::<T>()?;
        if descriptor.fields().len() < 2 {
            return Err(StoreError::InvalidArgument(format!(
                "{} has no fields besides its identity",
                descriptor.type_name()
            )));
        }
        let values = descriptor.params().to_update_params(records);
        let sql = descriptor.sql().update_batch(records.len());
        self.write(descriptor.type_name(), "update_all", &sql, &values)
    }

    pub fn delete<T: Record>(&self, record: &T) -> StoreResult<usize> {
        let descriptor = self.describe::<T>()?;
        let id = descriptor.params().to_delete_by_id_param(record)?;
        self.write(
            descriptor.type_name(),
            "delete",
            &descriptor.sql().delete_by_id(),
            std::slice::from_ref(&id),
        )
    }

    pub fn delete_all<T: Record>(&self, records: &[T]) -> StoreResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let descriptor = self.describe::<T>()?;
        let ids = descriptor.params().to_delete_by_ids_param(records)?;
        let sql = descriptor.sql().delete_by_ids(ids.len());
        self.write(descriptor.type_name(), "delete_all", &sql, &ids)
    }

    /// Runs one write statement with named parameters.
    pub fn execute(&self, sql: &str, params: &NamedParams) -> StoreResult<usize> {
        self.ensure_writable()?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        bind_named(&mut stmt, params)?;
        Ok(stmt.raw_execute()?)
    }

    /// Runs one prepared write statement once per parameter bag and returns
    /// the total number of affected rows.
    pub fn execute_batch(&self, sql: &str, batch: &[NamedParams]) -> StoreResult<usize> {
        self.ensure_writable()?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let mut affected = 0;
        for params in batch {
            bind_named(&mut stmt, params)?;
            affected += stmt.raw_execute()?;
        }
        Ok(affected)
    }

    /// Streams the rows of `sql` to `consume` in chunks of `chunk_size`.
    ///
    /// Returns the number of records delivered. The connection stays locked
    /// while the cursor is open.
    pub fn for_each_chunk<T, F>(
        &self,
        sql: &str,
        params: &NamedParams,
        chunk_size: usize,
        mut consume: F,
    ) -> StoreResult<usize>
    where
        T: Record,
        F: FnMut(Vec<T>) -> StoreResult<()>,
    {
        let descriptor = self.describe::<T>()?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        bind_named(&mut stmt, params)?;
        let mut rows = stmt.raw_query();

        let mapper = descriptor.mapper();
        let records = std::iter::from_fn(|| match rows.next() {
            Ok(Some(row)) => Some(mapper.map_row(row).map_err(StoreError::from)),
            Ok(None) => None,
            Err(err) => Some(Err(err.into())),
        });
        let chunks = Chunked::new(records, chunk_size)
            .map_err(|err| StoreError::InvalidArgument(err.to_string()))?;

        let mut delivered = 0;
        for chunk in chunks {
            let chunk = chunk.into_iter().collect::<StoreResult<Vec<T>>>()?;
            delivered += chunk.len();
            consume(chunk)?;
        }
        Ok(delivered)
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    fn write(
        &self,
        type_name: &str,
        op: &str,
        sql: &str,
        values: &[FieldValue],
    ) -> StoreResult<usize> {
        self.ensure_writable()?;
        let started_at = Instant::now();
        let result = self.conn.lock().execute(sql, params_from_iter(values.iter()));
        match result {
            Ok(rows) => {
                info!(
                    "event=store_write module=store status=ok op={} type={} rows={} duration_ms={}",
                    op,
                    type_name,
                    rows,
                    started_at.elapsed().as_millis()
                );
                Ok(rows)
            }
            Err(err) => {
                error!(
                    "event=store_write module=store status=error op={} type={} error={}",
                    op, type_name, err
                );
                Err(err.into())
            }
        }
    }
}

impl QueryExecutor for SqliteEntityStore {
    fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    fn query_records<T: Record>(
        &self,
        descriptor: &TypeDescriptor<T>,
        sql: &str,
        params: &NamedParams,
    ) -> StoreResult<Vec<T>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        bind_named(&mut stmt, params)?;
        let mut rows = stmt.raw_query();
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(descriptor.mapper().map_row(row)?);
        }
        Ok(records)
    }
}

fn bind_named(stmt: &mut Statement<'_>, params: &NamedParams) -> StoreResult<()> {
    for index in 1..=stmt.parameter_count() {
        let name = match stmt.parameter_name(index) {
            Some(declared) => declared.trim_start_matches([':', '@', '$']).to_string(),
            None => {
                return Err(StoreError::InvalidArgument(format!(
                    "parameter {index} is positional; named parameters are required"
                )))
            }
        };
        let value = params
            .value(&name)
            .ok_or_else(|| StoreError::MissingParameter(name.clone()))?;
        stmt.raw_bind_parameter(index, value)?;
    }
    Ok(())
}
