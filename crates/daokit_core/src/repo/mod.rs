//! Repositories: contract, class registry and per-manager cache.
//!
//! # Responsibility
//! - Define the `Repository` contract and its default `EntityDao`.
//! - Resolve which repository class serves an entity type.
//! - Cache one repository per owning type for the lifetime of a manager.

pub mod cache;
pub mod factory;
pub mod repository;
