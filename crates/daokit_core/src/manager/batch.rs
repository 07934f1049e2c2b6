//! Argument shapes accepted by the facade's batch and lookup calls.

use crate::model::entity::{canonical_type_name, EntityRecord};

/// Ordered entities handed to one `persist`/`remove` call.
///
/// Built from a single record or any slice/array/vec of records; never kept
/// after the call returns.
#[derive(Debug, Clone, Default)]
pub struct PendingBatch<'a> {
    items: Vec<&'a EntityRecord>,
}

impl<'a> PendingBatch<'a> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a EntityRecord> + '_ {
        self.items.iter().copied()
    }
}

impl<'a> From<&'a EntityRecord> for PendingBatch<'a> {
    fn from(value: &'a EntityRecord) -> Self {
        Self { items: vec![value] }
    }
}

impl<'a> From<&'a [EntityRecord]> for PendingBatch<'a> {
    fn from(value: &'a [EntityRecord]) -> Self {
        Self {
            items: value.iter().collect(),
        }
    }
}

impl<'a, const N: usize> From<&'a [EntityRecord; N]> for PendingBatch<'a> {
    fn from(value: &'a [EntityRecord; N]) -> Self {
        Self {
            items: value.iter().collect(),
        }
    }
}

impl<'a> From<&'a Vec<EntityRecord>> for PendingBatch<'a> {
    fn from(value: &'a Vec<EntityRecord>) -> Self {
        Self {
            items: value.iter().collect(),
        }
    }
}

impl<'a> From<Vec<&'a EntityRecord>> for PendingBatch<'a> {
    fn from(items: Vec<&'a EntityRecord>) -> Self {
        Self { items }
    }
}

impl<'a, const N: usize> From<[&'a EntityRecord; N]> for PendingBatch<'a> {
    fn from(value: [&'a EntityRecord; N]) -> Self {
        Self {
            items: value.to_vec(),
        }
    }
}

/// What a `clear` call drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    /// All managed state, cleared in one engine call.
    All,
    /// Listed types, one engine call each; an empty list clears nothing.
    Types(Vec<String>),
}

impl From<&str> for ClearScope {
    fn from(value: &str) -> Self {
        Self::Types(vec![value.to_string()])
    }
}

impl From<String> for ClearScope {
    fn from(value: String) -> Self {
        Self::Types(vec![value])
    }
}

impl From<Vec<String>> for ClearScope {
    fn from(value: Vec<String>) -> Self {
        Self::Types(value)
    }
}

impl From<&[&str]> for ClearScope {
    fn from(value: &[&str]) -> Self {
        Self::Types(value.iter().map(|name| name.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ClearScope {
    fn from(value: [&str; N]) -> Self {
        Self::Types(value.iter().map(|name| name.to_string()).collect())
    }
}

impl From<Option<&str>> for ClearScope {
    fn from(value: Option<&str>) -> Self {
        value.map_or(Self::All, Self::from)
    }
}

/// Type identifier or live instance passed to `get_repository`.
#[derive(Debug, Clone, Copy)]
pub enum EntityTarget<'a> {
    Name(&'a str),
    Instance(&'a EntityRecord),
}

impl<'a> EntityTarget<'a> {
    /// Canonical type name to look up; instances resolve to their real type.
    pub fn type_name(&self) -> &'a str {
        match *self {
            Self::Name(name) => canonical_type_name(name),
            Self::Instance(entity) => entity.real_type(),
        }
    }
}

impl<'a> From<&'a str> for EntityTarget<'a> {
    fn from(value: &'a str) -> Self {
        Self::Name(value)
    }
}

impl<'a> From<&'a String> for EntityTarget<'a> {
    fn from(value: &'a String) -> Self {
        Self::Name(value.as_str())
    }
}

impl<'a> From<&'a EntityRecord> for EntityTarget<'a> {
    fn from(value: &'a EntityRecord) -> Self {
        Self::Instance(value)
    }
}
