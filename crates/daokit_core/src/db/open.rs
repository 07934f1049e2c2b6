//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections from `ConnectionParams`.
//! - Configure connection pragmas required by the engine.
//! - Trigger storage migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have migrations fully applied.
//! - `foreign_keys` follows `ConnectionParams::foreign_keys`.

use super::migrations::apply_migrations;
use super::DbResult;
use crate::config::ConnectionParams;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens a SQLite database file with default parameters.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with_params(&ConnectionParams::file(path.as_ref()))
}

/// Opens an in-memory SQLite database with default parameters.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with_params(&ConnectionParams::default())
}

/// Opens the database described by `params` and applies pending migrations.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_with_params(params: &ConnectionParams) -> DbResult<Connection> {
    let started_at = Instant::now();
    let mode = params.mode();
    info!("event=db_open module=db status=start mode={mode}");

    let opened = match params.path.as_deref() {
        Some(path) => Connection::open(path),
        None => Connection::open_in_memory(),
    };
    let mut conn = match opened {
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

    match bootstrap_connection(&mut conn, params) {
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

fn bootstrap_connection(conn: &mut Connection, params: &ConnectionParams) -> DbResult<()> {
    let foreign_keys = if params.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
    conn.busy_timeout(Duration::from_millis(params.busy_timeout_ms))?;
    apply_migrations(conn)?;
    Ok(())
}
