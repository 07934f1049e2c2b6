//! Insert-if-absent on top of database uniqueness constraints.
//!
//! # Responsibility
//! - Persist and flush one entity; on a duplicate key, return the row that
//!   won the race instead of failing.
//!
//! # Invariants
//! - Only `EngineError::DuplicateKey` is recovered; every other failure
//!   propagates unchanged.
//! - Recovery is a single requery. If it finds nothing, the original
//!   duplicate-key error propagates.
//! - A losing entity is detached, so it is never flushed again implicitly.
//! - An entity the engine already manages is never written; its stored row
//!   comes back as `Existing`.

use crate::engine::{EngineError, EngineResult, PersistenceEngine, RowQuery, PRIMARY_KEY_NAME};
use crate::model::entity::EntityRecord;
use crate::model::metadata::UniqueKey;
use std::sync::Arc;

/// Result of `safe_persist`.
#[derive(Debug, Clone, PartialEq)]
pub enum SafePersistOutcome {
    /// The entity was inserted.
    Inserted(EntityRecord),
    /// A row with the same unique key already existed; this is that row.
    Existing(EntityRecord),
}

impl SafePersistOutcome {
    pub fn was_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }

    pub fn entity(&self) -> &EntityRecord {
        match self {
            Self::Inserted(entity) | Self::Existing(entity) => entity,
        }
    }

    pub fn into_entity(self) -> EntityRecord {
        match self {
            Self::Inserted(entity) | Self::Existing(entity) => entity,
        }
    }
}

pub struct UniqueInserter {
    engine: Arc<dyn PersistenceEngine>,
}

impl UniqueInserter {
    pub fn new(engine: Arc<dyn PersistenceEngine>) -> Self {
        Self { engine }
    }

    pub fn persist(&self, entity: &EntityRecord) -> EngineResult<SafePersistOutcome> {
        if self.engine.contains(entity)? {
            return self
                .engine
                .find(entity.real_type(), entity.uuid)?
                .map(SafePersistOutcome::Existing)
                .ok_or(EngineError::EntityNotFound(entity.uuid));
        }

        self.engine.persist(entity)?;
        let err = match self.engine.flush(Some(entity)) {
            Ok(()) => return Ok(SafePersistOutcome::Inserted(entity.clone())),
            Err(err) if err.is_duplicate_key() => err,
            Err(err) => return Err(err),
        };

        self.engine.detach(entity)?;
        match self.find_existing(entity, &err)? {
            Some(existing) => Ok(SafePersistOutcome::Existing(existing)),
            None => Err(err),
        }
    }

    fn find_existing(
        &self,
        entity: &EntityRecord,
        err: &EngineError,
    ) -> EngineResult<Option<EntityRecord>> {
        let EngineError::DuplicateKey { key, .. } = err else {
            return Ok(None);
        };
        if key == PRIMARY_KEY_NAME {
            return self.engine.find(entity.real_type(), entity.uuid);
        }

        let metadata = self.engine.get_class_metadata(entity.real_type())?;
        let candidates: Vec<&UniqueKey> = match metadata.unique_key(key) {
            Some(unique_key) => vec![unique_key],
            None => metadata.unique_keys.iter().collect(),
        };

        for unique_key in candidates {
            let Some(criteria) = unique_key.criteria_for(entity) else {
                continue;
            };
            let query = RowQuery::for_type(metadata.name.as_str())
                .with_criteria(criteria)
                .with_limit(1);
            if let Some(existing) = self.engine.find_by(&query)?.into_iter().next() {
                return Ok(Some(existing));
            }
        }

        Ok(None)
    }
}
