//! Query execution over mapped record types.
//!
//! # Responsibility
//! - Define the executor contract the pagination engine depends on.
//! - Provide the SQLite-backed entity store implementing it.
//!
//! # Invariants
//! - Named parameters are bound by the names the statement declares; a name
//!   missing from the bag is an error, never a silent NULL.
//!
//! # See also
//! - `crate::pagination::PaginationDao`

use crate::db::DbError;
use crate::mapping::{MappingError, MappingRegistry, NamedParams, Record, TypeDescriptor};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod sqlite;

pub use sqlite::SqliteEntityStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure of a store operation.
#[derive(Debug)]
pub enum StoreError {
    Mapping(MappingError),
    Db(DbError),
    /// A write was attempted on a read-only store.
    ReadOnly,
    /// The statement names a parameter the bag does not carry.
    MissingParameter(String),
    InvalidArgument(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mapping(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::ReadOnly => write!(f, "store is read-only"),
            Self::MissingParameter(name) => write!(f, "no value supplied for parameter `{name}`"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Mapping(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::ReadOnly | Self::MissingParameter(_) | Self::InvalidArgument(_) => None,
        }
    }
}

impl From<MappingError> for StoreError {
    fn from(value: MappingError) -> Self {
        Self::Mapping(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Executes read queries and maps their rows into records.
///
/// Implementations must tolerate concurrent calls from several threads.
/// Pagination lanes run their queries in parallel only as far as the
/// implementation lets them; one behind a single locked connection runs them
/// one at a time.
pub trait QueryExecutor: Send + Sync {
    fn registry(&self) -> &MappingRegistry;

    /// Runs `sql` with named `params` and maps every row through `descriptor`.
    fn query_records<T: Record>(
        &self,
        descriptor: &TypeDescriptor<T>,
        sql: &str,
        params: &NamedParams,
    ) -> StoreResult<Vec<T>>;
}
