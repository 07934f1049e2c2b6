//! Engine-side default hydrators.

use super::{HydrationMode, Hydrated, Hydrator};
use crate::engine::{EngineError, EngineResult, RawRow};
use crate::model::entity::FieldValue;

/// Plain record hydration: one record per row, no type checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordHydrator;

impl Hydrator for RecordHydrator {
    fn mode(&self) -> HydrationMode {
        HydrationMode::Object
    }

    fn hydrate(&self, rows: Vec<RawRow>) -> EngineResult<Hydrated> {
        Ok(Hydrated::Entities(
            rows.into_iter().map(RawRow::into_record).collect(),
        ))
    }
}

/// Field maps, one per row.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayHydrator;

impl Hydrator for ArrayHydrator {
    fn mode(&self) -> HydrationMode {
        HydrationMode::Array
    }

    fn hydrate(&self, rows: Vec<RawRow>) -> EngineResult<Hydrated> {
        Ok(Hydrated::Rows(rows.into_iter().map(|row| row.fields).collect()))
    }
}

/// The single projected value of every row.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarHydrator;

impl Hydrator for ScalarHydrator {
    fn mode(&self) -> HydrationMode {
        HydrationMode::Scalar
    }

    fn hydrate(&self, rows: Vec<RawRow>) -> EngineResult<Hydrated> {
        rows.into_iter()
            .map(single_field)
            .collect::<EngineResult<Vec<_>>>()
            .map(Hydrated::Scalars)
    }
}

/// Exactly one row with exactly one projected value.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleScalarHydrator;

impl Hydrator for SingleScalarHydrator {
    fn mode(&self) -> HydrationMode {
        HydrationMode::SingleScalar
    }

    fn hydrate(&self, rows: Vec<RawRow>) -> EngineResult<Hydrated> {
        let mut rows = rows.into_iter();
        let (Some(row), None) = (rows.next(), rows.next()) else {
            return Err(EngineError::Hydration(
                "single scalar hydration expects exactly one row".to_string(),
            ));
        };
        single_field(row).map(Hydrated::Scalar)
    }
}

fn single_field(row: RawRow) -> EngineResult<FieldValue> {
    let field_count = row.fields.len();
    let mut fields = row.fields.into_values();
    match (fields.next(), field_count) {
        (Some(value), 1) => Ok(value),
        _ => Err(EngineError::Hydration(format!(
            "scalar hydration expects exactly one projected field, row {} has {field_count}",
            row.uuid
        ))),
    }
}
