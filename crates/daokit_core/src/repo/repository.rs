//! Repository contract and the default `EntityDao` implementation.
//!
//! # Responsibility
//! - Provide per-type lookup and write shortcuts over the persistence engine.
//!
//! # Invariants
//! - Repositories own no entities; they hold only an engine handle and the
//!   metadata of their owning type.
//! - Every lookup is scoped to the repository's owning type.

use crate::config::DEFAULT_REPOSITORY_CLASS;
use crate::engine::{EngineResult, PersistenceEngine, RowQuery};
use crate::model::entity::{Criteria, EntityId, EntityRecord};
use crate::model::metadata::ClassMetadata;
use crate::repo::factory::RepositoryContext;
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Per-type facade over lookup and write operations.
///
/// Custom repositories implement the four required accessors and inherit the
/// lookups; `as_any` lets callers downcast to the concrete type.
pub trait Repository: Send + Sync {
    /// Registered class name this repository was built from.
    fn class_name(&self) -> &str;
    fn metadata(&self) -> &ClassMetadata;
    fn engine(&self) -> &Arc<dyn PersistenceEngine>;
    fn as_any(&self) -> &dyn Any;

    /// Canonical owning type served by this repository.
    fn entity_type(&self) -> &str {
        &self.metadata().name
    }

    fn find(&self, id: EntityId) -> EngineResult<Option<EntityRecord>> {
        self.engine().find(self.entity_type(), id)
    }

    fn find_by(&self, criteria: &Criteria) -> EngineResult<Vec<EntityRecord>> {
        let query = RowQuery::for_type(self.entity_type()).with_criteria(criteria.clone());
        self.engine().find_by(&query)
    }

    fn find_one_by(&self, criteria: &Criteria) -> EngineResult<Option<EntityRecord>> {
        let query = RowQuery::for_type(self.entity_type())
            .with_criteria(criteria.clone())
            .with_limit(1);
        Ok(self.engine().find_by(&query)?.into_iter().next())
    }

    fn find_all(&self) -> EngineResult<Vec<EntityRecord>> {
        self.engine().find_by(&RowQuery::for_type(self.entity_type()))
    }

    fn count_by(&self, criteria: &Criteria) -> EngineResult<usize> {
        Ok(self.find_by(criteria)?.len())
    }

    /// Persists and immediately flushes one entity.
    fn save(&self, entity: &EntityRecord) -> EngineResult<()> {
        self.engine().persist(entity)?;
        self.engine().flush(Some(entity))
    }

    /// Removes and immediately flushes one entity.
    fn delete(&self, entity: &EntityRecord) -> EngineResult<()> {
        self.engine().remove(entity)?;
        self.engine().flush(Some(entity))
    }
}

impl Debug for dyn Repository {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("class_name", &self.class_name())
            .field("entity_type", &self.entity_type())
            .finish()
    }
}

/// Default repository implementation.
pub struct EntityDao {
    class_name: String,
    engine: Arc<dyn PersistenceEngine>,
    metadata: Arc<ClassMetadata>,
}

impl EntityDao {
    pub fn new(context: RepositoryContext) -> Self {
        Self {
            class_name: context.class_name,
            engine: context.engine,
            metadata: context.metadata,
        }
    }

    /// Constructor shape expected by the repository registry.
    pub fn construct(context: RepositoryContext) -> Arc<dyn Repository> {
        Arc::new(Self::new(context))
    }

    pub fn is_default_class(&self) -> bool {
        self.class_name == DEFAULT_REPOSITORY_CLASS
    }
}

impl Repository for EntityDao {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn metadata(&self) -> &ClassMetadata {
        &self.metadata
    }

    fn engine(&self) -> &Arc<dyn PersistenceEngine> {
        &self.engine
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
