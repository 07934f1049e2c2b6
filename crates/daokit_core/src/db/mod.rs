//! SQLite storage bootstrap for the built-in persistence engine.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Apply the engine's storage migrations in deterministic order.
//! - Share one connection and its event dispatcher behind a lock.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No engine reads/writes happen before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod connection;
pub mod migrations;
mod open;

pub use connection::Connection;
pub use open::{open_db, open_db_in_memory, open_with_params};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    LockPoisoned(&'static str),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::LockPoisoned(operation) => {
                write!(f, "connection lock poisoned during {operation}")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::LockPoisoned(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
