//! Persistence engine contract and the built-in SQLite engine.
//!
//! # Responsibility
//! - Define the narrow interface the facade consumes: metadata lookup,
//!   single-item persist/remove/clear, flush, row loading, hydrator defaults.
//! - Classify engine failures so callers can single out duplicate keys.
//!
//! # Invariants
//! - Engines report a uniqueness violation only as `EngineError::DuplicateKey`.
//! - `load_rows` returns rows in insertion order unless the query orders them.

use crate::db::DbError;
use crate::hydration::{HydrationMode, Hydrator};
use crate::model::entity::{Criteria, EntityId, EntityRecord, FieldValue};
use crate::model::metadata::ClassMetadata;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod sqlite;
pub mod unit_of_work;

pub use sqlite::SqliteEngine;

/// Key name reported when the row identifier itself collides.
pub const PRIMARY_KEY_NAME: &str = "PRIMARY";

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure reported by a persistence engine.
#[derive(Debug)]
pub enum EngineError {
    Db(DbError),
    UnknownEntityType(String),
    DuplicateKey { entity_type: String, key: String },
    EntityNotFound(EntityId),
    /// Removal of a stored entity this engine does not manage.
    DetachedEntity(EntityId),
    UnknownHydrationMode(String),
    Hydration(String),
    InvalidData(String),
    LockPoisoned(&'static str),
}

impl EngineError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UnknownEntityType(name) => write!(f, "unknown entity type: {name}"),
            Self::DuplicateKey { entity_type, key } => {
                write!(f, "duplicate value for unique key `{key}` of {entity_type}")
            }
            Self::EntityNotFound(id) => write!(f, "entity not found: {id}"),
            Self::DetachedEntity(id) => {
                write!(f, "detached entity {id} cannot be removed; load it first")
            }
            Self::UnknownHydrationMode(mode) => write!(f, "unknown hydration mode: {mode}"),
            Self::Hydration(message) => write!(f, "hydration failed: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted entity data: {message}"),
            Self::LockPoisoned(operation) => write!(f, "engine lock poisoned during {operation}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for EngineError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Sort direction for one ordered field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Structured row lookup handed to `PersistenceEngine::load_rows`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowQuery {
    pub entity_type: String,
    pub id: Option<EntityId>,
    pub criteria: Criteria,
    pub order_by: Vec<(String, SortOrder)>,
    pub limit: Option<u32>,
    pub offset: u32,
    /// Fields to keep in each row; empty keeps all.
    pub projection: Vec<String>,
}

impl RowQuery {
    pub fn for_type(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Raw stored row before hydration.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub uuid: EntityId,
    /// Owning type the row is stored under.
    pub entity_type: String,
    /// Type name the entity was persisted with (may be a subtype).
    pub runtime_type: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl RawRow {
    pub fn into_record(self) -> EntityRecord {
        EntityRecord {
            uuid: self.uuid,
            entity_type: self.runtime_type,
            fields: self.fields,
        }
    }
}

/// Narrow persistence interface consumed by the entity manager facade.
pub trait PersistenceEngine: Send + Sync {
    /// Resolves metadata for a type name; aliases yield the owning type's metadata.
    fn get_class_metadata(&self, type_name: &str) -> EngineResult<Arc<ClassMetadata>>;
    /// Schedules one entity for insertion (or update, when already managed).
    fn persist(&self, entity: &EntityRecord) -> EngineResult<()>;
    /// Schedules one entity for removal.
    ///
    /// A never-stored entity is ignored; a stored but unmanaged one is
    /// rejected with `DetachedEntity`.
    fn remove(&self, entity: &EntityRecord) -> EngineResult<()>;
    /// Drops managed state for one type, or for all types when `None`.
    fn clear(&self, entity_type: Option<&str>) -> EngineResult<()>;
    /// Writes pending changes: all of them, or only those of `entity`.
    fn flush(&self, entity: Option<&EntityRecord>) -> EngineResult<()>;
    /// Forgets one entity and any change pending for it.
    fn detach(&self, entity: &EntityRecord) -> EngineResult<()>;
    /// Whether `entity` is managed: flushed or loaded, and not detached since.
    fn contains(&self, entity: &EntityRecord) -> EngineResult<bool>;
    /// Loads stored rows matching `query`.
    fn load_rows(&self, query: &RowQuery) -> EngineResult<Vec<RawRow>>;
    /// Default hydrator resolution.
    fn new_hydrator(&self, mode: &HydrationMode) -> EngineResult<Box<dyn Hydrator>>;
    /// Repository class used when metadata names no override.
    fn default_repository_class(&self) -> String;

    fn find_by(&self, query: &RowQuery) -> EngineResult<Vec<EntityRecord>> {
        Ok(self
            .load_rows(query)?
            .into_iter()
            .map(RawRow::into_record)
            .collect())
    }

    fn find(&self, entity_type: &str, id: EntityId) -> EngineResult<Option<EntityRecord>> {
        let query = RowQuery::for_type(entity_type).with_id(id).with_limit(1);
        Ok(self.find_by(&query)?.into_iter().next())
    }
}
