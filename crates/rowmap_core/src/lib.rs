//! Record/row mapping and parallel keyset pagination over SQLite.
//!
//! Record types declare their fields explicitly through [`Record`]; a
//! [`MappingRegistry`] turns each declaration into a cached descriptor used to
//! read rows, build write parameters and generate SQL. [`PaginationDao`]
//! streams large tables by fetching several pages concurrently per round.

pub mod config;
pub mod db;
pub mod logging;
pub mod mapping;
pub mod naming;
pub mod pagination;
pub mod sql;
pub mod store;
pub mod stream;

pub use config::StoreConfig;
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use mapping::{
    EnumTable, FieldDef, FieldValue, FieldValues, MappingError, MappingRegistry, MappingResult,
    NamedParams, Record, RecordSchema, SqlEnum, SqlType, TypeDescriptor,
};
pub use naming::to_column_name;
pub use pagination::{
    LaneCause, LaneFailure, PaginationDao, PaginationError, PaginationFailed,
    PaginationQueryComponents, PaginationSummary, SortOrder, SortingKey,
};
pub use store::{QueryExecutor, SqliteEntityStore, StoreError, StoreResult};
pub use stream::Chunked;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
