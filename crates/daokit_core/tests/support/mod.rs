#![allow(dead_code)]

use daokit_core::engine::{EngineError, EngineResult, PersistenceEngine, RawRow, RowQuery};
use daokit_core::hydration::{Hydrated, HydrationMode, Hydrator};
use daokit_core::model::entity::{canonical_type_name, EntityId, EntityRecord};
use daokit_core::model::metadata::{ClassMetadata, MappingDriver, StaticMappingDriver};
use daokit_core::{Configuration, EntityManager, DEFAULT_REPOSITORY_CLASS};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// One engine call observed by `RecordingEngine`.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Metadata(String),
    Persist(EntityId),
    Remove(EntityId),
    Clear(Option<String>),
    Flush(Option<EntityId>),
    Detach(EntityId),
    LoadRows(RowQuery),
    NewHydrator(HydrationMode),
}

/// In-memory engine that records every call it receives.
///
/// Stored rows are returned by `load_rows`; flush results can be scripted per
/// call with `push_flush_result`. `contains` answers from `manage` and is not
/// recorded.
#[derive(Default)]
pub struct RecordingEngine {
    driver: StaticMappingDriver,
    calls: Mutex<Vec<Call>>,
    rows: Mutex<Vec<RawRow>>,
    managed: Mutex<HashSet<EntityId>>,
    flush_results: Mutex<VecDeque<EngineResult<()>>>,
    metadata_delay: Option<Duration>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, metadata: ClassMetadata) -> Self {
        self.driver = self.driver.register(metadata).expect("register test type");
        self
    }

    pub fn with_alias(mut self, subtype: &str, owning_type: &str) -> Self {
        self.driver = self
            .driver
            .alias(subtype, owning_type)
            .expect("register test alias");
        self
    }

    /// Slows metadata lookups so concurrent callers overlap.
    pub fn with_metadata_delay(mut self, delay: Duration) -> Self {
        self.metadata_delay = Some(delay);
        self
    }

    pub fn store(&self, owning_type: &str, entity: &EntityRecord) {
        self.rows.lock().expect("rows lock").push(RawRow {
            uuid: entity.uuid,
            entity_type: owning_type.to_string(),
            runtime_type: entity.entity_type.clone(),
            fields: entity.fields.clone(),
        });
    }

    /// Marks `entity` as managed, as if flushed or loaded earlier.
    pub fn manage(&self, entity: &EntityRecord) {
        self.managed.lock().expect("managed lock").insert(entity.uuid);
    }

    pub fn push_flush_result(&self, result: EngineResult<()>) {
        self.flush_results
            .lock()
            .expect("flush results lock")
            .push_back(result);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Calls other than metadata lookups.
    pub fn operations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::Metadata(_)))
            .collect()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().expect("calls lock").clear();
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

impl PersistenceEngine for RecordingEngine {
    fn get_class_metadata(&self, type_name: &str) -> EngineResult<Arc<ClassMetadata>> {
        self.record(Call::Metadata(type_name.to_string()));
        if let Some(delay) = self.metadata_delay {
            thread::sleep(delay);
        }
        self.driver
            .load_metadata(canonical_type_name(type_name))
            .map(Arc::new)
            .ok_or_else(|| EngineError::UnknownEntityType(type_name.to_string()))
    }

    fn persist(&self, entity: &EntityRecord) -> EngineResult<()> {
        self.get_class_metadata(entity.real_type())?;
        self.record(Call::Persist(entity.uuid));
        Ok(())
    }

    fn remove(&self, entity: &EntityRecord) -> EngineResult<()> {
        self.get_class_metadata(entity.real_type())?;
        self.record(Call::Remove(entity.uuid));
        Ok(())
    }

    fn clear(&self, entity_type: Option<&str>) -> EngineResult<()> {
        self.record(Call::Clear(entity_type.map(str::to_string)));
        Ok(())
    }

    fn flush(&self, entity: Option<&EntityRecord>) -> EngineResult<()> {
        self.record(Call::Flush(entity.map(|entity| entity.uuid)));
        self.flush_results
            .lock()
            .expect("flush results lock")
            .pop_front()
            .unwrap_or(Ok(()))
    }

    fn detach(&self, entity: &EntityRecord) -> EngineResult<()> {
        self.record(Call::Detach(entity.uuid));
        Ok(())
    }

    fn contains(&self, entity: &EntityRecord) -> EngineResult<bool> {
        Ok(self.managed.lock().expect("managed lock").contains(&entity.uuid))
    }

    fn load_rows(&self, query: &RowQuery) -> EngineResult<Vec<RawRow>> {
        self.record(Call::LoadRows(query.clone()));
        let owning_type = self
            .driver
            .load_metadata(&query.entity_type)
            .ok_or_else(|| EngineError::UnknownEntityType(query.entity_type.clone()))?
            .name;
        let rows = self.rows.lock().expect("rows lock");
        Ok(rows
            .iter()
            .filter(|row| row.entity_type == owning_type)
            .filter(|row| query.id.map_or(true, |id| id == row.uuid))
            .filter(|row| {
                query
                    .criteria
                    .iter()
                    .all(|(name, value)| row.fields.get(name) == Some(value))
            })
            .take(query.limit.map_or(usize::MAX, |limit| limit as usize))
            .cloned()
            .collect())
    }

    fn new_hydrator(&self, mode: &HydrationMode) -> EngineResult<Box<dyn Hydrator>> {
        self.record(Call::NewHydrator(mode.clone()));
        Ok(Box::new(EchoHydrator { mode: mode.clone() }))
    }

    fn default_repository_class(&self) -> String {
        DEFAULT_REPOSITORY_CLASS.to_string()
    }
}

/// Hydrator that reports only the mode it was built for.
pub struct EchoHydrator {
    pub mode: HydrationMode,
}

impl Hydrator for EchoHydrator {
    fn mode(&self) -> HydrationMode {
        self.mode.clone()
    }

    fn hydrate(&self, rows: Vec<RawRow>) -> EngineResult<Hydrated> {
        Ok(Hydrated::Entities(
            rows.into_iter().map(RawRow::into_record).collect(),
        ))
    }
}

/// `app::User` with a unique `email`, `app::Admin` aliasing it, plus `shop::Order`.
pub fn user_engine() -> RecordingEngine {
    RecordingEngine::new()
        .with_type(ClassMetadata::new("app::User").with_unique_key("email", ["email"]))
        .with_alias("app::Admin", "app::User")
        .with_type(ClassMetadata::new("shop::Order"))
}

pub fn stub_manager(engine: RecordingEngine) -> (EntityManager, Arc<RecordingEngine>) {
    let engine = Arc::new(engine);
    let manager = EntityManager::with_engine(
        Arc::clone(&engine) as Arc<dyn PersistenceEngine>,
        Configuration::new(),
    );
    (manager, engine)
}

/// Mapping used by the SQLite-backed tests.
pub fn sqlite_configuration() -> Configuration {
    let driver = StaticMappingDriver::new()
        .register(
            ClassMetadata::new("app::User")
                .with_unique_key("email", ["email"])
                .with_unique_key("handle", ["tenant", "handle"]),
        )
        .and_then(|driver| driver.alias("app::Admin", "app::User"))
        .and_then(|driver| driver.register(ClassMetadata::new("shop::Order")))
        .expect("test mapping");
    Configuration::new().with_metadata_driver(driver)
}

pub fn sqlite_manager() -> EntityManager {
    EntityManager::create(
        daokit_core::ConnectionParams::default(),
        sqlite_configuration(),
        None,
    )
    .expect("in-memory entity manager")
}

pub fn user(email: &str) -> EntityRecord {
    EntityRecord::new("app::User")
        .with_field("email", email)
        .with_field("name", email.split('@').next().unwrap_or(email))
}

pub fn uuids(entities: &[EntityRecord]) -> Vec<EntityId> {
    entities.iter().map(|entity| entity.uuid).collect()
}
