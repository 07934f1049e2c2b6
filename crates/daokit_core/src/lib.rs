//! Entity manager facade over a pluggable persistence engine.
//!
//! The facade batches persist/remove/clear calls, caches one repository per
//! owning entity type, inserts entities safely against unique constraints and
//! selects hydrators. `EntityManager::create` wires it to the bundled SQLite
//! engine; `EntityManager::with_engine` accepts any `PersistenceEngine`.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod event;
pub mod hydration;
pub mod logging;
pub mod manager;
pub mod model;
pub mod query;
pub mod repo;

pub use config::{ConfigError, Configuration, ConnectionParams, DEFAULT_REPOSITORY_CLASS};
pub use db::{open_db, open_db_in_memory, Connection, DbError};
pub use engine::{
    EngineError, EngineResult, PersistenceEngine, RawRow, RowQuery, SortOrder, SqliteEngine,
};
pub use error::{EmResult, EntityManagerError};
pub use event::{EventDispatcher, LifecycleEvent, LifecycleEventArgs};
pub use hydration::{Hydrated, HydrationMode, Hydrator};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use manager::{
    ClearScope, ConnectionSource, EntityManager, EntityTarget, PendingBatch, SafePersistOutcome,
};
pub use model::entity::{Criteria, EntityId, EntityRecord, FieldValue};
pub use model::metadata::{ClassMetadata, MappingDriver, StaticMappingDriver, UniqueKey};
pub use query::{QueryBuilder, Selection};
pub use repo::factory::RepositoryContext;
pub use repo::repository::{EntityDao, Repository};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
