//! Facade-level error taxonomy.
//!
//! # Invariants
//! - Engine failures are wrapped, never rewritten; `DuplicateKey` reaches
//!   callers unchanged everywhere except `safe_persist`.
//! - Construction errors (`InvalidConfiguration`, `MismatchedEventDispatcher`)
//!   are only produced by `EntityManager::create`.

use crate::db::DbError;
use crate::engine::EngineError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type EmResult<T> = Result<T, EntityManagerError>;

#[derive(Debug)]
pub enum EntityManagerError {
    /// Metadata lookup failed for the requested type.
    UnknownEntityType(String),
    /// Metadata or the default names a repository class nobody registered.
    UnknownRepositoryClass {
        class_name: String,
        entity_type: String,
    },
    /// Facade construction without a usable configuration.
    InvalidConfiguration(String),
    /// An explicit event dispatcher differs from the connection's own.
    MismatchedEventDispatcher,
    /// Query built without enough information to run.
    InvalidQuery(String),
    LockPoisoned(&'static str),
    Engine(EngineError),
}

impl EntityManagerError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::Engine(err) if err.is_duplicate_key())
    }
}

impl Display for EntityManagerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownEntityType(name) => write!(f, "unknown entity type: {name}"),
            Self::UnknownRepositoryClass {
                class_name,
                entity_type,
            } => write!(
                f,
                "repository class `{class_name}` for {entity_type} is not registered"
            ),
            Self::InvalidConfiguration(message) => {
                write!(f, "invalid entity manager configuration: {message}")
            }
            Self::MismatchedEventDispatcher => write!(
                f,
                "explicit event dispatcher does not match the connection's event dispatcher"
            ),
            Self::InvalidQuery(message) => write!(f, "invalid query: {message}"),
            Self::LockPoisoned(operation) => {
                write!(f, "entity manager lock poisoned during {operation}")
            }
            Self::Engine(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EntityManagerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Engine(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EngineError> for EntityManagerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<DbError> for EntityManagerError {
    fn from(value: DbError) -> Self {
        Self::Engine(EngineError::Db(value))
    }
}
