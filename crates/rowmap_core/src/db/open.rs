//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by core behavior.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Read-only configurations open the file with read-only flags.

use super::{DbError, DbResult};
use crate::config::StoreConfig;
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use std::time::{Duration, Instant};

/// Opens the database described by `config`.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
///
/// # Errors
/// - `InvalidConfig` for a read-only configuration without a path.
/// - `Sqlite` when opening or configuring the connection fails.
pub fn open_db(config: &StoreConfig) -> DbResult<Connection> {
    let started_at = Instant::now();
    let mode = match (&config.path, config.read_only) {
        (None, false) => "memory",
        (None, true) => {
            error!(
                "event=db_open module=db status=error mode=memory error_code=invalid_config error=read_only_without_path"
            );
            return Err(DbError::InvalidConfig(
                "a read-only store requires a database path".to_string(),
            ));
        }
        (Some(_), false) => "file",
        (Some(_), true) => "file_read_only",
    };
    info!("event=db_open module=db status=start mode={mode}");

    let opened = match &config.path {
        None => Connection::open_in_memory(),
        Some(path) if config.read_only => Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        ),
        Some(path) => Connection::open(path),
    };
    let conn = match opened {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&conn, config.busy_timeout()) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Opens a private in-memory database with default settings.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_db(&StoreConfig::in_memory())
}

fn bootstrap_connection(conn: &Connection, busy_timeout: Duration) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}
