//! Entity manager facade.
//!
//! # Responsibility
//! - Expand batch persist/remove/clear calls into single-item engine calls.
//! - Own the repository cache and notify `repository_created` observers.
//! - Select hydrators and host the lazily built unique inserter.
//! - Build facades over a SQLite connection (`create`) or any engine
//!   (`with_engine`).
//!
//! # Invariants
//! - Batch items reach the engine one at a time, in input order.
//! - Engine failures propagate unchanged; only `safe_persist` absorbs
//!   duplicate keys.
//! - Observers run after cache insertion, outside the cache lock and the
//!   observer lock, once per created repository, in registration order.
//! - An observer registered during a notification first runs for the next
//!   created repository.

use crate::config::{Configuration, ConnectionParams};
use crate::db::Connection;
use crate::engine::{EngineError, PersistenceEngine, SqliteEngine};
use crate::error::{EmResult, EntityManagerError};
use crate::event::EventDispatcher;
use crate::hydration::{HydrationMode, Hydrator, ObjectHydrator, SimpleObjectHydrator};
use crate::model::entity::EntityRecord;
use crate::query::{QueryBuilder, Selection};
use crate::repo::cache::RepositoryCache;
use crate::repo::repository::Repository;
use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock};

mod batch;
mod inserter;

pub use batch::{ClearScope, EntityTarget, PendingBatch};
pub use inserter::{SafePersistOutcome, UniqueInserter};

/// Callback invoked after a repository is created and cached.
pub type RepositoryCreatedObserver =
    Arc<dyn Fn(&EntityManager, &Arc<dyn Repository>) + Send + Sync>;

/// Connection argument of [`EntityManager::create`].
pub enum ConnectionSource {
    /// Open a new connection from parameters.
    Params(ConnectionParams),
    /// Reuse an already open connection.
    Connection(Arc<Connection>),
}

impl From<ConnectionParams> for ConnectionSource {
    fn from(value: ConnectionParams) -> Self {
        Self::Params(value)
    }
}

impl From<Arc<Connection>> for ConnectionSource {
    fn from(value: Arc<Connection>) -> Self {
        Self::Connection(value)
    }
}

/// Orchestration surface over a persistence engine.
pub struct EntityManager {
    engine: Arc<dyn PersistenceEngine>,
    configuration: Arc<Configuration>,
    connection: Option<Arc<Connection>>,
    repositories: RepositoryCache,
    observers: RwLock<Vec<RepositoryCreatedObserver>>,
    unique_inserter: OnceCell<UniqueInserter>,
}

impl EntityManager {
    /// Builds a facade over the built-in SQLite engine.
    ///
    /// # Errors
    /// - `InvalidConfiguration` when no mapping driver is configured; checked
    ///   before any connection is opened.
    /// - `MismatchedEventDispatcher` when `event_dispatcher` is given together
    ///   with an existing connection bound to a different dispatcher.
    /// - Engine/database errors from opening a new connection.
    pub fn create(
        source: impl Into<ConnectionSource>,
        configuration: Configuration,
        event_dispatcher: Option<Arc<EventDispatcher>>,
    ) -> EmResult<Self> {
        if configuration.metadata_driver().is_none() {
            error!(
                "event=entity_manager_create module=manager status=error error_code=missing_mapping_driver"
            );
            return Err(EntityManagerError::InvalidConfiguration(
                "no metadata mapping driver configured".to_string(),
            ));
        }

        let connection = match source.into() {
            ConnectionSource::Params(params) => {
                let event_dispatcher = event_dispatcher.unwrap_or_default();
                Arc::new(Connection::open(params, event_dispatcher)?)
            }
            ConnectionSource::Connection(connection) => {
                if let Some(explicit) = event_dispatcher {
                    if !Arc::ptr_eq(connection.event_dispatcher(), &explicit) {
                        error!(
                            "event=entity_manager_create module=manager status=error error_code=mismatched_event_dispatcher"
                        );
                        return Err(EntityManagerError::MismatchedEventDispatcher);
                    }
                }
                connection
            }
        };

        let configuration = Arc::new(configuration);
        let engine = Arc::new(SqliteEngine::new(
            Arc::clone(&connection),
            Arc::clone(&configuration),
        ));
        info!(
            "event=entity_manager_create module=manager status=ok mode={}",
            connection.params().mode()
        );
        Ok(Self::assemble(engine, configuration, Some(connection)))
    }

    /// Builds a facade over a caller-supplied engine.
    pub fn with_engine(engine: Arc<dyn PersistenceEngine>, configuration: Configuration) -> Self {
        Self::assemble(engine, Arc::new(configuration), None)
    }

    fn assemble(
        engine: Arc<dyn PersistenceEngine>,
        configuration: Arc<Configuration>,
        connection: Option<Arc<Connection>>,
    ) -> Self {
        Self {
            engine,
            configuration,
            connection,
            repositories: RepositoryCache::new(),
            observers: RwLock::new(Vec::new()),
            unique_inserter: OnceCell::new(),
        }
    }

    pub fn engine(&self) -> &Arc<dyn PersistenceEngine> {
        &self.engine
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Connection of a facade built by `create`; `None` for custom engines.
    pub fn connection(&self) -> Option<&Arc<Connection>> {
        self.connection.as_ref()
    }

    pub fn event_dispatcher(&self) -> Option<&Arc<EventDispatcher>> {
        self.connection
            .as_ref()
            .map(|connection| connection.event_dispatcher())
    }

    /// Schedules every entity of `batch` for insertion, in order.
    pub fn persist<'a>(&self, batch: impl Into<PendingBatch<'a>>) -> EmResult<&Self> {
        let batch = batch.into();
        debug!(
            "event=batch_persist module=manager status=start items={}",
            batch.len()
        );
        for entity in batch.iter() {
            self.engine.persist(entity)?;
        }
        Ok(self)
    }

    /// Schedules every entity of `batch` for removal, in order.
    pub fn remove<'a>(&self, batch: impl Into<PendingBatch<'a>>) -> EmResult<&Self> {
        let batch = batch.into();
        debug!(
            "event=batch_remove module=manager status=start items={}",
            batch.len()
        );
        for entity in batch.iter() {
            self.engine.remove(entity)?;
        }
        Ok(self)
    }

    /// Clears managed state for the listed types, or all of it.
    pub fn clear(&self, scope: impl Into<ClearScope>) -> EmResult<&Self> {
        match scope.into() {
            ClearScope::All => {
                debug!("event=clear module=manager status=start scope=all");
                self.engine.clear(None)?;
            }
            ClearScope::Types(types) => {
                debug!(
                    "event=clear module=manager status=start scope=types count={}",
                    types.len()
                );
                for entity_type in &types {
                    self.engine.clear(Some(entity_type))?;
                }
            }
        }
        Ok(self)
    }

    /// Clears all managed state with a single engine call.
    pub fn clear_all(&self) -> EmResult<&Self> {
        self.clear(ClearScope::All)
    }

    /// Writes pending changes: all of them, or only those of `entity`.
    pub fn flush(&self, entity: Option<&EntityRecord>) -> EmResult<&Self> {
        self.engine.flush(entity)?;
        Ok(self)
    }

    /// Shared unique inserter, built on first use.
    pub fn unique_inserter(&self) -> &UniqueInserter {
        self.unique_inserter
            .get_or_init(|| UniqueInserter::new(Arc::clone(&self.engine)))
    }

    /// Inserts `entity` unless a row with one of its unique keys exists.
    ///
    /// See [`UniqueInserter`] for the recovery contract.
    pub fn safe_persist(&self, entity: &EntityRecord) -> EmResult<SafePersistOutcome> {
        match self.unique_inserter().persist(entity) {
            Ok(outcome) => {
                info!(
                    "event=safe_persist module=manager status=ok entity_type={} inserted={}",
                    entity.real_type(),
                    outcome.was_inserted()
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(
                    "event=safe_persist module=manager status=error entity_type={} error={}",
                    entity.real_type(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Returns the repository of a type name or of an instance's real type.
    ///
    /// The same instance is returned for a type, its aliases and its proxies.
    ///
    /// # Errors
    /// - `UnknownEntityType` when metadata lookup fails.
    /// - `UnknownRepositoryClass` when the resolved class is not registered.
    pub fn get_repository<'a>(
        &self,
        target: impl Into<EntityTarget<'a>>,
    ) -> EmResult<Arc<dyn Repository>> {
        let type_name = target.into().type_name();
        let engine = &self.engine;
        let factory = self.configuration.repository_factory();

        let lookup = self.repositories.lookup_or_create(
            type_name,
            |name| {
                engine
                    .get_class_metadata(name)
                    .map_err(|err| match err {
                        EngineError::UnknownEntityType(_) => {
                            EntityManagerError::UnknownEntityType(name.to_string())
                        }
                        other => other.into(),
                    })
            },
            |metadata| factory.create(engine, metadata),
        )?;

        if lookup.created {
            info!(
                "event=repository_created module=manager status=ok entity_type={} class={}",
                lookup.repository.entity_type(),
                lookup.repository.class_name()
            );
            self.notify_repository_created(&lookup.repository)?;
        } else {
            debug!(
                "event=repository_cache_hit module=manager status=ok entity_type={}",
                type_name
            );
        }
        Ok(lookup.repository)
    }

    /// Alias of [`EntityManager::get_repository`].
    pub fn get_dao<'a>(&self, target: impl Into<EntityTarget<'a>>) -> EmResult<Arc<dyn Repository>> {
        self.get_repository(target)
    }

    /// Registers a `repository_created` observer.
    pub fn on_repository_created(
        &self,
        observer: impl Fn(&EntityManager, &Arc<dyn Repository>) + Send + Sync + 'static,
    ) -> EmResult<()> {
        self.observers
            .write()
            .map_err(|_| EntityManagerError::LockPoisoned("observer registration"))?
            .push(Arc::new(observer));
        Ok(())
    }

    fn notify_repository_created(&self, repository: &Arc<dyn Repository>) -> EmResult<()> {
        let observers: Vec<RepositoryCreatedObserver> = self
            .observers
            .read()
            .map_err(|_| EntityManagerError::LockPoisoned("observer notification"))?
            .clone();
        for observer in &observers {
            observer(self, repository);
        }
        Ok(())
    }

    /// Hydrator for `mode`: facade object hydrators, engine default otherwise.
    pub fn new_hydrator(&self, mode: &HydrationMode) -> EmResult<Box<dyn Hydrator>> {
        match mode {
            HydrationMode::Object => Ok(Box::new(ObjectHydrator::new(Arc::clone(&self.engine)))),
            HydrationMode::SimpleObject => Ok(Box::new(SimpleObjectHydrator::new())),
            other => Ok(self.engine.new_hydrator(other)?),
        }
    }

    pub fn create_query_builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }

    pub fn create_selection(&self) -> Selection<'_> {
        Selection::new(self)
    }
}

impl Debug for EntityManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityManager")
            .field("configuration", &self.configuration)
            .field("connection", &self.connection)
            .field("repositories", &self.repositories.len().ok())
            .field("unique_inserter_ready", &self.unique_inserter.get().is_some())
            .finish_non_exhaustive()
    }
}
