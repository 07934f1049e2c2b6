//! Entity records and mapping metadata.
//!
//! # Responsibility
//! - Define the record shape shared by the facade, repositories and engines.
//! - Describe per-type mapping facts consumed by the persistence engine.
//!
//! # Invariants
//! - Every record is identified by a stable `EntityId`.
//! - Type names are compared only in canonical form.

pub mod entity;
pub mod metadata;
