//! Repository class registry and instantiation.
//!
//! # Responsibility
//! - Map repository class names to constructors.
//! - Choose the class for one entity type: metadata override first, then the
//!   engine-wide default.

use crate::config::DEFAULT_REPOSITORY_CLASS;
use crate::engine::PersistenceEngine;
use crate::error::{EmResult, EntityManagerError};
use crate::model::entity::canonical_type_name;
use crate::model::metadata::ClassMetadata;
use crate::repo::repository::{EntityDao, Repository};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything a repository constructor receives.
pub struct RepositoryContext {
    pub class_name: String,
    pub engine: Arc<dyn PersistenceEngine>,
    pub metadata: Arc<ClassMetadata>,
}

pub type RepositoryConstructor =
    Arc<dyn Fn(RepositoryContext) -> Arc<dyn Repository> + Send + Sync>;

#[derive(Clone)]
pub struct RepositoryFactory {
    constructors: BTreeMap<String, RepositoryConstructor>,
}

impl Default for RepositoryFactory {
    fn default() -> Self {
        let mut factory = Self {
            constructors: BTreeMap::new(),
        };
        factory.register(DEFAULT_REPOSITORY_CLASS, Arc::new(EntityDao::construct));
        factory
    }
}

impl RepositoryFactory {
    pub fn register(&mut self, class_name: &str, constructor: RepositoryConstructor) {
        self.constructors
            .insert(canonical_type_name(class_name).to_string(), constructor);
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.constructors
            .contains_key(canonical_type_name(class_name))
    }

    pub fn class_names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Resolves the repository class for `metadata` and instantiates it.
    pub fn create(
        &self,
        engine: &Arc<dyn PersistenceEngine>,
        metadata: Arc<ClassMetadata>,
    ) -> EmResult<Arc<dyn Repository>> {
        let class_name = match metadata.custom_repository.as_deref() {
            Some(custom) => canonical_type_name(custom).to_string(),
            None => canonical_type_name(&engine.default_repository_class()).to_string(),
        };
        let Some(constructor) = self.constructors.get(&class_name) else {
            return Err(EntityManagerError::UnknownRepositoryClass {
                class_name,
                entity_type: metadata.name.clone(),
            });
        };

        Ok(constructor(RepositoryContext {
            class_name,
            engine: Arc::clone(engine),
            metadata,
        }))
    }
}
