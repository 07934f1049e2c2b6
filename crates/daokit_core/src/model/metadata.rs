//! Entity metadata and mapping drivers.
//!
//! # Responsibility
//! - Describe the storage-relevant facts of one entity type: owning name,
//!   repository override, unique keys.
//! - Provide the programmatic mapping driver used by the SQLite engine.
//!
//! # Invariants
//! - `ClassMetadata::name` is always a canonical type name.
//! - Looking up an alias yields the owning type's metadata.

use crate::model::entity::{canonical_type_name, Criteria, EntityRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

static TYPE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(::[A-Za-z_][A-Za-z0-9_]*)*$").expect("valid type name regex")
});

/// Named set of fields that must be unique across all rows of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueKey {
    pub name: String,
    pub fields: Vec<String>,
}

impl UniqueKey {
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds a lookup filter from the entity's values for this key.
    ///
    /// Returns `None` when any key field is missing or null, since such rows
    /// never collide.
    pub fn criteria_for(&self, entity: &EntityRecord) -> Option<Criteria> {
        let mut criteria = Criteria::new();
        for field in &self.fields {
            let value = entity.get(field).filter(|value| !value.is_null())?;
            criteria.insert(field.clone(), value.clone());
        }
        Some(criteria)
    }
}

/// Descriptive record of an entity type's mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMetadata {
    /// Canonical name of the owning type.
    pub name: String,
    /// Repository class registered for this type, if it overrides the default.
    pub custom_repository: Option<String>,
    pub unique_keys: Vec<UniqueKey>,
}

impl ClassMetadata {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: canonical_type_name(name.as_ref()).to_string(),
            custom_repository: None,
            unique_keys: Vec::new(),
        }
    }

    pub fn with_repository(mut self, class_name: impl AsRef<str>) -> Self {
        self.custom_repository = Some(canonical_type_name(class_name.as_ref()).to_string());
        self
    }

    pub fn with_unique_key<I, S>(mut self, name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_keys.push(UniqueKey::new(name, fields));
        self
    }

    pub fn unique_key(&self, name: &str) -> Option<&UniqueKey> {
        self.unique_keys.iter().find(|key| key.name == name)
    }
}

/// Source of entity metadata.
pub trait MappingDriver: Send + Sync {
    /// Loads metadata for a canonical type name, `None` when unmapped.
    fn load_metadata(&self, type_name: &str) -> Option<ClassMetadata>;
}

/// Mapping driver fed by in-code registrations.
#[derive(Debug, Clone, Default)]
pub struct StaticMappingDriver {
    entities: BTreeMap<String, ClassMetadata>,
    aliases: BTreeMap<String, String>,
}

impl StaticMappingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one owning entity type.
    pub fn register(mut self, metadata: ClassMetadata) -> Result<Self, MappingError> {
        ensure_valid_type_name(&metadata.name)?;
        if self.entities.contains_key(&metadata.name) || self.aliases.contains_key(&metadata.name)
        {
            return Err(MappingError::DuplicateTypeName(metadata.name));
        }
        self.entities.insert(metadata.name.clone(), metadata);
        Ok(self)
    }

    /// Registers `subtype` as resolving to the already registered `owning_type`.
    pub fn alias(mut self, subtype: &str, owning_type: &str) -> Result<Self, MappingError> {
        let subtype = canonical_type_name(subtype);
        let owning_type = canonical_type_name(owning_type);
        ensure_valid_type_name(subtype)?;
        if !self.entities.contains_key(owning_type) {
            return Err(MappingError::UnknownOwningType(owning_type.to_string()));
        }
        if self.entities.contains_key(subtype) || self.aliases.contains_key(subtype) {
            return Err(MappingError::DuplicateTypeName(subtype.to_string()));
        }
        self.aliases
            .insert(subtype.to_string(), owning_type.to_string());
        Ok(self)
    }
}

impl MappingDriver for StaticMappingDriver {
    fn load_metadata(&self, type_name: &str) -> Option<ClassMetadata> {
        let type_name = canonical_type_name(type_name);
        if let Some(metadata) = self.entities.get(type_name) {
            return Some(metadata.clone());
        }
        let owning_type = self.aliases.get(type_name)?;
        self.entities.get(owning_type).cloned()
    }
}

fn ensure_valid_type_name(name: &str) -> Result<(), MappingError> {
    if TYPE_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(MappingError::InvalidTypeName(name.to_string()))
    }
}

/// Mapping registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    InvalidTypeName(String),
    DuplicateTypeName(String),
    UnknownOwningType(String),
}

impl Display for MappingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTypeName(value) => write!(f, "invalid entity type name: `{value}`"),
            Self::DuplicateTypeName(value) => write!(f, "entity type already mapped: {value}"),
            Self::UnknownOwningType(value) => {
                write!(f, "alias targets unmapped entity type: {value}")
            }
        }
    }
}

impl Error for MappingError {}
