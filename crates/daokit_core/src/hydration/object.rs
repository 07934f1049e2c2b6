//! Facade-owned object hydrators.
//!
//! # Responsibility
//! - `ObjectHydrator`: hydrate rows of any mapped type (including subtypes)
//!   into records typed by their real runtime type, one record per identity.
//! - `SimpleObjectHydrator`: hydrate rows of exactly one owning type, with no
//!   identity folding.
//!
//! # Invariants
//! - Both hydrators keep row order.
//! - Hydrated records never carry a proxy type name.

use super::{HydrationMode, Hydrated, Hydrator};
use crate::engine::{EngineError, EngineResult, PersistenceEngine, RawRow};
use crate::model::entity::{real_type_name, EntityRecord};
use std::collections::HashSet;
use std::sync::Arc;

/// Full object hydration backed by engine metadata.
pub struct ObjectHydrator {
    engine: Arc<dyn PersistenceEngine>,
}

impl ObjectHydrator {
    pub fn new(engine: Arc<dyn PersistenceEngine>) -> Self {
        Self { engine }
    }
}

impl Hydrator for ObjectHydrator {
    fn mode(&self) -> HydrationMode {
        HydrationMode::Object
    }

    fn hydrate(&self, rows: Vec<RawRow>) -> EngineResult<Hydrated> {
        let mut seen = HashSet::with_capacity(rows.len());
        let mut entities = Vec::with_capacity(rows.len());

        for row in rows {
            if !seen.insert(row.uuid) {
                continue;
            }
            let real_type = real_type_name(&row.runtime_type).to_string();
            // Unmapped runtime types fail here instead of leaking out as records.
            self.engine.get_class_metadata(&real_type)?;
            entities.push(EntityRecord {
                uuid: row.uuid,
                entity_type: real_type,
                fields: row.fields,
            });
        }

        Ok(Hydrated::Entities(entities))
    }
}

/// Single-type object hydration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleObjectHydrator;

impl SimpleObjectHydrator {
    pub fn new() -> Self {
        Self
    }
}

impl Hydrator for SimpleObjectHydrator {
    fn mode(&self) -> HydrationMode {
        HydrationMode::SimpleObject
    }

    fn hydrate(&self, rows: Vec<RawRow>) -> EngineResult<Hydrated> {
        let mut owning_type: Option<String> = None;
        let mut entities = Vec::with_capacity(rows.len());

        for row in rows {
            let expected = owning_type.get_or_insert_with(|| row.entity_type.clone());
            if *expected != row.entity_type {
                return Err(EngineError::Hydration(format!(
                    "simple object hydration expects one entity type, got {expected} and {}",
                    row.entity_type
                )));
            }
            entities.push(EntityRecord {
                uuid: row.uuid,
                entity_type: real_type_name(&row.runtime_type).to_string(),
                fields: row.fields,
            });
        }

        Ok(Hydrated::Entities(entities))
    }
}
