//! Hydration modes and hydrator strategies.
//!
//! # Responsibility
//! - Name the supported hydration modes.
//! - Convert raw stored rows into the result shape a mode promises.
//!
//! # Invariants
//! - Hydrators are stateless; one instance may hydrate any number of batches.

use crate::engine::{EngineResult, RawRow};
use crate::model::entity::{EntityRecord, FieldValue};
use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};

pub mod basic;
pub mod object;

pub use basic::{ArrayHydrator, RecordHydrator, ScalarHydrator, SingleScalarHydrator};
pub use object::{ObjectHydrator, SimpleObjectHydrator};

/// Result shape requested from a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HydrationMode {
    Object,
    SimpleObject,
    Array,
    Scalar,
    SingleScalar,
    Custom(String),
}

impl HydrationMode {
    pub fn name(&self) -> &str {
        match self {
            Self::Object => "object",
            Self::SimpleObject => "simple-object",
            Self::Array => "array",
            Self::Scalar => "scalar",
            Self::SingleScalar => "single-scalar",
            Self::Custom(name) => name.as_str(),
        }
    }

    /// Parses a mode name; unrecognized names become `Custom`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "object" => Self::Object,
            "simple-object" | "simple_object" => Self::SimpleObject,
            "array" => Self::Array,
            "scalar" => Self::Scalar,
            "single-scalar" | "single_scalar" => Self::SingleScalar,
            _ => Self::Custom(value.trim().to_string()),
        }
    }
}

impl Display for HydrationMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Hydrated query result.
#[derive(Debug, Clone, PartialEq)]
pub enum Hydrated {
    Entities(Vec<EntityRecord>),
    Rows(Vec<BTreeMap<String, FieldValue>>),
    Scalars(Vec<FieldValue>),
    Scalar(FieldValue),
}

impl Hydrated {
    pub fn len(&self) -> usize {
        match self {
            Self::Entities(entities) => entities.len(),
            Self::Rows(rows) => rows.len(),
            Self::Scalars(values) => values.len(),
            Self::Scalar(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_entities(self) -> Option<Vec<EntityRecord>> {
        match self {
            Self::Entities(entities) => Some(entities),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Option<Vec<BTreeMap<String, FieldValue>>> {
        match self {
            Self::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

/// Converts raw rows into one result shape.
pub trait Hydrator: Send {
    fn mode(&self) -> HydrationMode;
    fn hydrate(&self, rows: Vec<RawRow>) -> EngineResult<Hydrated>;
}

impl Debug for dyn Hydrator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hydrator").field("mode", &self.mode()).finish()
    }
}
