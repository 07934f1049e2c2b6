//! Entity record model and type-name canonicalization.
//!
//! # Responsibility
//! - Define the dynamically shaped record passed through the facade.
//! - Resolve runtime type names to canonical, non-proxy entity type names.
//!
//! # Invariants
//! - `canonical_type_name` is idempotent.
//! - `real_type_name` never returns a name carrying the proxy marker.
//! - `uuid` is stable for the lifetime of a record and its persisted row.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Stable identifier of one entity row.
pub type EntityId = Uuid;

/// Equality filter keyed by field name.
pub type Criteria = BTreeMap<String, FieldValue>;

/// Separator between namespace segments of a type identifier.
pub const NAMESPACE_SEPARATOR: &str = "::";

/// Namespace segment that marks a generated proxy type.
///
/// `proxies::__CG__::app::User` is a proxy of `app::User`.
pub const PROXY_MARKER: &str = "__CG__";

/// Scalar value stored in one entity field.
///
/// Serialized untagged, so payloads read as plain JSON objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Total order used for sorting query results.
    ///
    /// Nulls sort first, then booleans, numbers, and text. Integers and reals
    /// compare numerically with each other.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Integer(_) | Self::Real(_), Self::Integer(_) | Self::Real(_)) => self
                .as_f64()
                .partial_cmp(&other.as_f64())
                .unwrap_or(Ordering::Equal),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Real(value) => Some(*value),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Integer(_) | Self::Real(_) => 2,
            Self::Text(_) => 3,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One entity instance as seen by the facade and the persistence engine.
///
/// `entity_type` is the runtime type name and may name a proxy or a subtype;
/// use [`EntityRecord::real_type`] to get the canonical real type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub uuid: EntityId,
    pub entity_type: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl EntityRecord {
    /// Creates an empty record with a generated stable ID.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), entity_type)
    }

    /// Creates an empty record with a caller-provided stable ID.
    pub fn with_id(uuid: EntityId, entity_type: impl Into<String>) -> Self {
        Self {
            uuid,
            entity_type: entity_type.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Canonical real type of this record, with any proxy prefix removed.
    pub fn real_type(&self) -> &str {
        real_type_name(&self.entity_type)
    }

    /// Returns whether every criterion matches a field of this record.
    ///
    /// A `Null` criterion matches both an explicit null and a missing field.
    pub fn matches(&self, criteria: &Criteria) -> bool {
        criteria.iter().all(|(name, expected)| match self.fields.get(name) {
            Some(actual) => actual == expected,
            None => expected.is_null(),
        })
    }
}

/// Strips leading namespace separators from a type identifier.
pub fn canonical_type_name(name: &str) -> &str {
    name.trim().trim_start_matches(NAMESPACE_SEPARATOR)
}

/// Resolves a runtime type name to the real type it stands for.
///
/// Proxy names carry the [`PROXY_MARKER`] segment; everything up to and
/// including that segment is dropped.
pub fn real_type_name(name: &str) -> &str {
    let canonical = canonical_type_name(name);
    let marker = format!("{PROXY_MARKER}{NAMESPACE_SEPARATOR}");
    match canonical.rfind(marker.as_str()) {
        Some(position) => canonical_type_name(&canonical[position + marker.len()..]),
        None => canonical,
    }
}

#[cfg(test)]
mod tests {
    use super::{canonical_type_name, real_type_name, Criteria, EntityRecord, FieldValue};
    use std::cmp::Ordering;

    #[test]
    fn canonical_type_name_strips_leading_separators_idempotently() {
        assert_eq!(canonical_type_name("::app::User"), "app::User");
        assert_eq!(canonical_type_name("::::app::User"), "app::User");
        let once = canonical_type_name("::app::User");
        assert_eq!(canonical_type_name(once), once);
    }

    #[test]
    fn real_type_name_unwraps_proxy_types() {
        assert_eq!(real_type_name("proxies::__CG__::app::User"), "app::User");
        assert_eq!(real_type_name("::proxies::__CG__::app::User"), "app::User");
        assert_eq!(real_type_name("app::User"), "app::User");
    }

    #[test]
    fn record_real_type_ignores_proxy_wrapper() {
        let record = EntityRecord::new("proxies::__CG__::shop::Order");
        assert_eq!(record.real_type(), "shop::Order");
    }

    #[test]
    fn matches_treats_missing_field_as_null() {
        let record = EntityRecord::new("app::User").with_field("email", "a@example.com");

        let mut criteria = Criteria::new();
        criteria.insert("email".to_string(), "a@example.com".into());
        assert!(record.matches(&criteria));

        criteria.insert("deleted_at".to_string(), FieldValue::Null);
        assert!(record.matches(&criteria));

        criteria.insert("name".to_string(), "bob".into());
        assert!(!record.matches(&criteria));
    }

    #[test]
    fn sort_cmp_orders_mixed_numbers_numerically() {
        assert_eq!(
            FieldValue::Integer(2).sort_cmp(&FieldValue::Real(1.5)),
            Ordering::Greater
        );
        assert_eq!(
            FieldValue::Null.sort_cmp(&FieldValue::Text("a".to_string())),
            Ordering::Less
        );
    }

    #[test]
    fn field_values_serialize_as_plain_json() {
        let record = EntityRecord::new("app::User")
            .with_field("age", 42)
            .with_field("nickname", Option::<String>::None);
        let json = serde_json::to_value(&record.fields).expect("fields serialize");
        assert_eq!(json["age"], serde_json::json!(42));
        assert!(json["nickname"].is_null());
    }
}
