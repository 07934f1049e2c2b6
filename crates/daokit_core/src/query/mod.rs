//! Query builders bound to one entity manager.
//!
//! # Responsibility
//! - Collect type, equality criteria, ordering and paging into a `RowQuery`.
//! - Run it through the engine and hydrate with a facade-selected hydrator.
//!
//! # Invariants
//! - Builders borrow the manager; they never outlive it and never cache rows.
//! - A query without an entity type is rejected before reaching the engine.

use crate::engine::{RowQuery, SortOrder};
use crate::error::{EmResult, EntityManagerError};
use crate::hydration::{Hydrated, HydrationMode};
use crate::manager::EntityManager;
use crate::model::entity::{canonical_type_name, Criteria, EntityRecord, FieldValue};

mod selection;

pub use selection::Selection;

/// Fluent entity query.
#[derive(Debug)]
pub struct QueryBuilder<'em> {
    manager: &'em EntityManager,
    query: RowQuery,
}

impl<'em> QueryBuilder<'em> {
    pub(crate) fn new(manager: &'em EntityManager) -> Self {
        Self {
            manager,
            query: RowQuery::default(),
        }
    }

    pub fn from(mut self, entity_type: &str) -> Self {
        self.query.entity_type = canonical_type_name(entity_type).to_string();
        self
    }

    /// Adds `field = value`; a later call on the same field replaces it.
    pub fn where_eq(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.query.criteria.insert(field.to_string(), value.into());
        self
    }

    pub fn order_by(mut self, field: &str, order: SortOrder) -> Self {
        self.query.order_by.push((field.to_string(), order));
        self
    }

    pub fn set_max_results(mut self, limit: u32) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn set_first_result(mut self, offset: u32) -> Self {
        self.query.offset = offset;
        self
    }

    /// Returns the collected query, validated.
    pub fn get_query(&self) -> EmResult<RowQuery> {
        validated(&self.query)
    }

    pub fn get_result(&self, mode: &HydrationMode) -> EmResult<Hydrated> {
        run(self.manager, &self.query, mode)
    }

    /// Object-hydrated records.
    pub fn get_entities(&self) -> EmResult<Vec<EntityRecord>> {
        let hydrated = self.get_result(&HydrationMode::Object)?;
        hydrated.into_entities().ok_or_else(|| {
            EntityManagerError::InvalidQuery("object hydration returned no entities".to_string())
        })
    }

    /// First matching record, if any.
    pub fn get_one_or_null_result(&self) -> EmResult<Option<EntityRecord>> {
        let mut query = validated(&self.query)?;
        query.limit = Some(1);
        let hydrated = run(self.manager, &query, &HydrationMode::Object)?;
        Ok(hydrated.into_entities().and_then(|entities| entities.into_iter().next()))
    }
}

fn validated(query: &RowQuery) -> EmResult<RowQuery> {
    if query.entity_type.is_empty() {
        return Err(EntityManagerError::InvalidQuery(
            "no entity type given; call `from` first".to_string(),
        ));
    }
    Ok(query.clone())
}

pub(crate) fn run(
    manager: &EntityManager,
    query: &RowQuery,
    mode: &HydrationMode,
) -> EmResult<Hydrated> {
    let query = validated(query)?;
    let hydrator = manager.new_hydrator(mode)?;
    let rows = manager.engine().load_rows(&query)?;
    Ok(hydrator.hydrate(rows)?)
}

/// Builds equality criteria from `(field, value)` pairs.
pub fn criteria<const N: usize>(pairs: [(&str, FieldValue); N]) -> Criteria {
    pairs
        .into_iter()
        .map(|(field, value)| (field.to_string(), value))
        .collect()
}
