//! Field projection query.

use super::run;
use crate::engine::{RowQuery, SortOrder};
use crate::error::{EmResult, EntityManagerError};
use crate::hydration::{Hydrated, HydrationMode};
use crate::manager::EntityManager;
use crate::model::entity::{canonical_type_name, FieldValue};
use std::collections::BTreeMap;

/// Projection over selected fields, returned as plain maps or one scalar.
#[derive(Debug)]
pub struct Selection<'em> {
    manager: &'em EntityManager,
    query: RowQuery,
}

impl<'em> Selection<'em> {
    pub(crate) fn new(manager: &'em EntityManager) -> Self {
        Self {
            manager,
            query: RowQuery::default(),
        }
    }

    /// Adds projected fields; no call at all keeps every field.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query
            .projection
            .extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn from(mut self, entity_type: &str) -> Self {
        self.query.entity_type = canonical_type_name(entity_type).to_string();
        self
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.query.criteria.insert(field.to_string(), value.into());
        self
    }

    pub fn order_by(mut self, field: &str, order: SortOrder) -> Self {
        self.query.order_by.push((field.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn fetch(&self) -> EmResult<Vec<BTreeMap<String, FieldValue>>> {
        run(self.manager, &self.query, &HydrationMode::Array)?
            .into_rows()
            .ok_or_else(|| {
                EntityManagerError::InvalidQuery("array hydration returned no rows".to_string())
            })
    }

    /// Exactly one row with exactly one projected field.
    pub fn fetch_single(&self) -> EmResult<FieldValue> {
        match run(self.manager, &self.query, &HydrationMode::SingleScalar)? {
            Hydrated::Scalar(value) => Ok(value),
            other => Err(EntityManagerError::InvalidQuery(format!(
                "expected a single scalar, got {} values",
                other.len()
            ))),
        }
    }
}
