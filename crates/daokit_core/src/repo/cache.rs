//! Repository cache with atomic lookup-or-create.
//!
//! # Responsibility
//! - Map canonical type names (owning types and their aliases) to repositories.
//! - Build each owning type's repository at most once.
//!
//! # Invariants
//! - Resolution and insertion happen under one lock acquisition; two racing
//!   lookups for the same uncached type never both create.
//! - An alias key always maps to the same instance as its owning type.
//! - Entries are never evicted.

use crate::error::{EmResult, EntityManagerError};
use crate::model::entity::canonical_type_name;
use crate::model::metadata::ClassMetadata;
use crate::repo::repository::Repository;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const MAX_ALIAS_DEPTH: usize = 8;

/// Outcome of one cache lookup.
pub struct CacheLookup {
    pub repository: Arc<dyn Repository>,
    /// `true` when this call built the repository.
    pub created: bool,
}

#[derive(Default)]
pub struct RepositoryCache {
    entries: Mutex<HashMap<String, Arc<dyn Repository>>>,
}

impl RepositoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the repository cached for `key`, resolving and building it on a miss.
    ///
    /// `resolve` maps a type name to its metadata; when the metadata names a
    /// different owning type, resolution continues with that name and every
    /// name visited on the way is cached as an alias of the final instance.
    /// `create` is called at most once, with the owning type's metadata.
    pub fn lookup_or_create<R, C>(&self, key: &str, resolve: R, create: C) -> EmResult<CacheLookup>
    where
        R: Fn(&str) -> EmResult<Arc<ClassMetadata>>,
        C: FnOnce(Arc<ClassMetadata>) -> EmResult<Arc<dyn Repository>>,
    {
        let key = canonical_type_name(key);
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| EntityManagerError::LockPoisoned("repository cache"))?;

        if let Some(repository) = entries.get(key) {
            return Ok(CacheLookup {
                repository: Arc::clone(repository),
                created: false,
            });
        }

        let mut aliases: Vec<String> = Vec::new();
        let mut current = key.to_string();
        let (repository, created) = loop {
            if let Some(repository) = entries.get(&current) {
                break (Arc::clone(repository), false);
            }

            let metadata = resolve(&current)?;
            let owning_type = canonical_type_name(&metadata.name);
            if owning_type == current {
                let repository = create(metadata)?;
                entries.insert(current.clone(), Arc::clone(&repository));
                break (repository, true);
            }

            if aliases.len() >= MAX_ALIAS_DEPTH {
                return Err(EntityManagerError::UnknownEntityType(key.to_string()));
            }
            let next = owning_type.to_string();
            aliases.push(std::mem::replace(&mut current, next));
        };

        for alias in aliases {
            entries.insert(alias, Arc::clone(&repository));
        }

        Ok(CacheLookup {
            repository,
            created,
        })
    }

    pub fn get(&self, key: &str) -> EmResult<Option<Arc<dyn Repository>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| EntityManagerError::LockPoisoned("repository cache"))?;
        Ok(entries.get(canonical_type_name(key)).cloned())
    }

    pub fn len(&self) -> EmResult<usize> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| EntityManagerError::LockPoisoned("repository cache"))?;
        Ok(entries.len())
    }

    pub fn is_empty(&self) -> EmResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::RepositoryCache;
    use crate::engine::{EngineResult, PersistenceEngine, RawRow, RowQuery};
    use crate::error::EntityManagerError;
    use crate::hydration::{HydrationMode, Hydrator, RecordHydrator};
    use crate::model::entity::EntityRecord;
    use crate::model::metadata::ClassMetadata;
    use crate::repo::factory::RepositoryContext;
    use crate::repo::repository::{EntityDao, Repository};
    use std::cell::Cell;
    use std::sync::Arc;

    struct NullEngine;

    impl PersistenceEngine for NullEngine {
        fn get_class_metadata(&self, type_name: &str) -> EngineResult<Arc<ClassMetadata>> {
            Ok(Arc::new(ClassMetadata::new(type_name)))
        }
        fn persist(&self, _entity: &EntityRecord) -> EngineResult<()> {
            Ok(())
        }
        fn remove(&self, _entity: &EntityRecord) -> EngineResult<()> {
            Ok(())
        }
        fn clear(&self, _entity_type: Option<&str>) -> EngineResult<()> {
            Ok(())
        }
        fn flush(&self, _entity: Option<&EntityRecord>) -> EngineResult<()> {
            Ok(())
        }
        fn detach(&self, _entity: &EntityRecord) -> EngineResult<()> {
            Ok(())
        }
        fn contains(&self, _entity: &EntityRecord) -> EngineResult<bool> {
            Ok(false)
        }
        fn load_rows(&self, _query: &RowQuery) -> EngineResult<Vec<RawRow>> {
            Ok(Vec::new())
        }
        fn new_hydrator(&self, _mode: &HydrationMode) -> EngineResult<Box<dyn Hydrator>> {
            Ok(Box::new(RecordHydrator))
        }
        fn default_repository_class(&self) -> String {
            "daokit::EntityDao".to_string()
        }
    }

    fn build(metadata: Arc<ClassMetadata>) -> Result<Arc<dyn Repository>, EntityManagerError> {
        Ok(EntityDao::construct(RepositoryContext {
            class_name: "daokit::EntityDao".to_string(),
            engine: Arc::new(NullEngine),
            metadata,
        }))
    }

    fn owner_of(name: &str) -> Result<Arc<ClassMetadata>, EntityManagerError> {
        let owner = match name {
            "app::Admin" => "app::User",
            "app::SuperAdmin" => "app::Admin",
            other => other,
        };
        Ok(Arc::new(ClassMetadata::new(owner)))
    }

    #[test]
    fn second_lookup_hits_cache() {
        let cache = RepositoryCache::new();
        let first = cache
            .lookup_or_create("app::User", owner_of, build)
            .expect("first lookup");
        assert!(first.created);

        let second = cache
            .lookup_or_create("::app::User", owner_of, |_| panic!("must not rebuild"))
            .expect("second lookup");
        assert!(!second.created);
        assert!(Arc::ptr_eq(&first.repository, &second.repository));
    }

    #[test]
    fn alias_chain_caches_every_visited_name() {
        let cache = RepositoryCache::new();
        let resolved = Cell::new(0);
        let lookup = cache
            .lookup_or_create(
                "app::SuperAdmin",
                |name| {
                    resolved.set(resolved.get() + 1);
                    owner_of(name)
                },
                build,
            )
            .expect("alias lookup");
        assert!(lookup.created);
        assert_eq!(resolved.get(), 3);
        assert_eq!(lookup.repository.entity_type(), "app::User");
        assert_eq!(cache.len().expect("len"), 3);

        for name in ["app::User", "app::Admin", "app::SuperAdmin"] {
            let cached = cache.get(name).expect("get").expect("cached");
            assert!(Arc::ptr_eq(&cached, &lookup.repository));
        }
    }

    #[test]
    fn alias_of_cached_owner_reuses_instance() {
        let cache = RepositoryCache::new();
        let owner = cache
            .lookup_or_create("app::User", owner_of, build)
            .expect("owner lookup");
        let alias = cache
            .lookup_or_create("app::Admin", owner_of, |_| panic!("must not rebuild"))
            .expect("alias lookup");
        assert!(!alias.created);
        assert!(Arc::ptr_eq(&owner.repository, &alias.repository));
    }

    #[test]
    fn resolve_failure_leaves_cache_untouched() {
        let cache = RepositoryCache::new();
        let err = cache
            .lookup_or_create(
                "app::Ghost",
                |name| Err(EntityManagerError::UnknownEntityType(name.to_string())),
                build,
            )
            .err()
            .expect("lookup must fail");
        assert!(matches!(err, EntityManagerError::UnknownEntityType(name) if name == "app::Ghost"));
        assert!(cache.is_empty().expect("is_empty"));
    }
}
