//! SQLite-backed persistence engine.
//!
//! # Responsibility
//! - Resolve metadata through the configured mapping driver.
//! - Schedule changes in a unit of work and write them transactionally.
//! - Enforce declared unique keys through the `unique_keys` table, so the
//!   database decides every uniqueness race.
//!
//! # Invariants
//! - A flush writes all taken changes in one transaction or none of them.
//! - Lock order is unit of work, then connection. `load_rows` never holds both.
//! - Lifecycle listeners run with no engine lock held.

use super::unit_of_work::{ChangeKind, PendingChange, UnitOfWork};
use super::{EngineError, EngineResult, PersistenceEngine, RawRow, RowQuery, SortOrder, PRIMARY_KEY_NAME};
use crate::config::Configuration;
use crate::db::Connection;
use crate::event::{LifecycleEvent, LifecycleEventArgs};
use crate::hydration::{
    ArrayHydrator, HydrationMode, Hydrator, RecordHydrator, ScalarHydrator, SingleScalarHydrator,
};
use crate::model::entity::{canonical_type_name, Criteria, EntityId, EntityRecord, FieldValue};
use crate::model::metadata::{ClassMetadata, UniqueKey};
use log::{debug, error, info};
use rusqlite::{ffi, params, ErrorCode, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;
use uuid::Uuid;

/// Built-in engine storing entities as JSON payload rows.
pub struct SqliteEngine {
    connection: Arc<Connection>,
    configuration: Arc<Configuration>,
    metadata: RwLock<HashMap<String, Arc<ClassMetadata>>>,
    unit_of_work: Mutex<UnitOfWork>,
}

impl SqliteEngine {
    pub fn new(connection: Arc<Connection>, configuration: Arc<Configuration>) -> Self {
        Self {
            connection,
            configuration,
            metadata: RwLock::new(HashMap::new()),
            unit_of_work: Mutex::new(UnitOfWork::new()),
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Number of changes waiting for a flush.
    pub fn pending_changes(&self) -> EngineResult<usize> {
        Ok(self.lock_unit_of_work("pending count")?.pending_len())
    }

    fn lock_unit_of_work(&self, operation: &'static str) -> EngineResult<MutexGuard<'_, UnitOfWork>> {
        self.unit_of_work
            .lock()
            .map_err(|_| EngineError::LockPoisoned(operation))
    }

    fn row_exists(&self, entity_id: EntityId) -> EngineResult<bool> {
        self.connection.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM entities WHERE uuid = ?1);",
                [entity_id.to_string()],
                |row| row.get::<_, bool>(0),
            )?;
            Ok(exists)
        })
    }

    fn dispatch(&self, args: LifecycleEventArgs<'_>) {
        self.connection.event_dispatcher().dispatch(&args);
    }

    fn write_changes(&self, changes: &[PendingChange]) -> EngineResult<()> {
        let mut metadata = Vec::with_capacity(changes.len());
        for change in changes {
            metadata.push(self.get_class_metadata(&change.owning_type)?);
        }

        self.connection.with_conn(|conn| {
            let tx = conn.transaction()?;
            for (change, metadata) in changes.iter().zip(&metadata) {
                match change.kind {
                    ChangeKind::Insert => insert_entity(&tx, change, metadata)?,
                    ChangeKind::Update => update_entity(&tx, change, metadata)?,
                    ChangeKind::Delete => delete_entity(&tx, change)?,
                }
            }
            tx.commit()?;
            Ok(())
        })
    }
}

impl PersistenceEngine for SqliteEngine {
    fn get_class_metadata(&self, type_name: &str) -> EngineResult<Arc<ClassMetadata>> {
        let type_name = canonical_type_name(type_name);
        if let Some(metadata) = self
            .metadata
            .read()
            .map_err(|_| EngineError::LockPoisoned("metadata read"))?
            .get(type_name)
        {
            return Ok(Arc::clone(metadata));
        }

        let driver = self
            .configuration
            .metadata_driver()
            .ok_or_else(|| EngineError::UnknownEntityType(type_name.to_string()))?;
        let metadata = driver
            .load_metadata(type_name)
            .map(Arc::new)
            .ok_or_else(|| EngineError::UnknownEntityType(type_name.to_string()))?;

        self.metadata
            .write()
            .map_err(|_| EngineError::LockPoisoned("metadata write"))?
            .insert(type_name.to_string(), Arc::clone(&metadata));
        Ok(metadata)
    }

    fn persist(&self, entity: &EntityRecord) -> EngineResult<()> {
        let metadata = self.get_class_metadata(entity.real_type())?;
        self.dispatch(LifecycleEventArgs::for_entity(LifecycleEvent::PrePersist, entity));
        self.lock_unit_of_work("persist")?
            .schedule_persist(&metadata.name, entity);
        Ok(())
    }

    fn remove(&self, entity: &EntityRecord) -> EngineResult<()> {
        let metadata = self.get_class_metadata(entity.real_type())?;
        let tracked = self.lock_unit_of_work("remove")?.tracks(entity.uuid);
        if !tracked && self.row_exists(entity.uuid)? {
            return Err(EngineError::DetachedEntity(entity.uuid));
        }
        self.dispatch(LifecycleEventArgs::for_entity(LifecycleEvent::PreRemove, entity));
        self.lock_unit_of_work("remove")?
            .schedule_remove(&metadata.name, entity);
        Ok(())
    }

    fn clear(&self, entity_type: Option<&str>) -> EngineResult<()> {
        let owning_type = match entity_type {
            Some(name) => Some(self.get_class_metadata(name)?.name.clone()),
            None => None,
        };
        self.lock_unit_of_work("clear")?.clear(owning_type.as_deref());
        self.dispatch(LifecycleEventArgs::for_type(
            LifecycleEvent::OnClear,
            owning_type.as_deref(),
        ));
        Ok(())
    }

    fn flush(&self, entity: Option<&EntityRecord>) -> EngineResult<()> {
        let started_at = Instant::now();
        let changes = {
            let mut unit_of_work = self.lock_unit_of_work("flush")?;
            let changes = unit_of_work.take(entity.map(|entity| entity.uuid));
            match self.write_changes(&changes) {
                Ok(()) => unit_of_work.mark_flushed(&changes),
                Err(err) => {
                    unit_of_work.restore(changes);
                    error!(
                        "event=flush module=engine status=error duration_ms={} error={}",
                        started_at.elapsed().as_millis(),
                        err
                    );
                    return Err(err);
                }
            }
            changes
        };

        info!(
            "event=flush module=engine status=ok changes={} duration_ms={}",
            changes.len(),
            started_at.elapsed().as_millis()
        );
        for change in &changes {
            let event = match change.kind {
                ChangeKind::Insert | ChangeKind::Update => LifecycleEvent::PostPersist,
                ChangeKind::Delete => LifecycleEvent::PostRemove,
            };
            self.dispatch(LifecycleEventArgs::for_entity(event, &change.entity));
        }
        self.dispatch(LifecycleEventArgs::for_type(LifecycleEvent::PostFlush, None));
        Ok(())
    }

    fn detach(&self, entity: &EntityRecord) -> EngineResult<()> {
        self.lock_unit_of_work("detach")?.detach(entity.uuid);
        Ok(())
    }

    fn contains(&self, entity: &EntityRecord) -> EngineResult<bool> {
        Ok(self.lock_unit_of_work("contains")?.is_managed(entity.uuid))
    }

    fn load_rows(&self, query: &RowQuery) -> EngineResult<Vec<RawRow>> {
        let metadata = self.get_class_metadata(&query.entity_type)?;
        let rows = self
            .connection
            .with_conn(|conn| select_rows(conn, &metadata.name, query))?;

        let rows: Vec<RawRow> = rows
            .into_iter()
            .map(|mut row| {
                if !query.projection.is_empty() {
                    row.fields.retain(|name, _| query.projection.contains(name));
                }
                row
            })
            .collect();

        let mut unit_of_work = self.lock_unit_of_work("register loaded")?;
        for row in &rows {
            unit_of_work.register_managed(row.uuid, &row.entity_type);
        }
        debug!(
            "event=load_rows module=engine status=ok entity_type={} rows={}",
            metadata.name,
            rows.len()
        );
        Ok(rows)
    }

    fn new_hydrator(&self, mode: &HydrationMode) -> EngineResult<Box<dyn Hydrator>> {
        match mode {
            HydrationMode::Object | HydrationMode::SimpleObject => Ok(Box::new(RecordHydrator)),
            HydrationMode::Array => Ok(Box::new(ArrayHydrator)),
            HydrationMode::Scalar => Ok(Box::new(ScalarHydrator)),
            HydrationMode::SingleScalar => Ok(Box::new(SingleScalarHydrator)),
            HydrationMode::Custom(name) => self
                .configuration
                .custom_hydrator(name)
                .ok_or_else(|| EngineError::UnknownHydrationMode(name.clone())),
        }
    }

    fn default_repository_class(&self) -> String {
        self.configuration.default_repository_class().to_string()
    }
}

fn insert_entity(
    tx: &Transaction<'_>,
    change: &PendingChange,
    metadata: &ClassMetadata,
) -> EngineResult<()> {
    let entity = &change.entity;
    tx.execute(
        "INSERT INTO entities (uuid, entity_type, runtime_type, payload)
         VALUES (?1, ?2, ?3, ?4);",
        params![
            entity.uuid.to_string(),
            metadata.name.as_str(),
            entity.entity_type.as_str(),
            encode_payload(entity)?,
        ],
    )
    .map_err(|err| write_error(err, &metadata.name, PRIMARY_KEY_NAME))?;
    insert_unique_keys(tx, entity, metadata)
}

fn update_entity(
    tx: &Transaction<'_>,
    change: &PendingChange,
    metadata: &ClassMetadata,
) -> EngineResult<()> {
    let entity = &change.entity;
    let changed = tx.execute(
        "UPDATE entities
         SET
            runtime_type = ?2,
            payload = ?3,
            updated_at = (strftime('%s', 'now') * 1000)
         WHERE uuid = ?1;",
        params![
            entity.uuid.to_string(),
            entity.entity_type.as_str(),
            encode_payload(entity)?,
        ],
    )?;
    if changed == 0 {
        return Err(EngineError::EntityNotFound(entity.uuid));
    }

    tx.execute(
        "DELETE FROM unique_keys WHERE entity_uuid = ?1;",
        [entity.uuid.to_string()],
    )?;
    insert_unique_keys(tx, entity, metadata)
}

fn delete_entity(tx: &Transaction<'_>, change: &PendingChange) -> EngineResult<()> {
    let uuid = change.entity.uuid.to_string();
    tx.execute("DELETE FROM unique_keys WHERE entity_uuid = ?1;", [&uuid])?;
    tx.execute("DELETE FROM entities WHERE uuid = ?1;", [&uuid])?;
    Ok(())
}

fn insert_unique_keys(
    tx: &Transaction<'_>,
    entity: &EntityRecord,
    metadata: &ClassMetadata,
) -> EngineResult<()> {
    for key in &metadata.unique_keys {
        let Some(value) = encode_key_value(entity, key)? else {
            continue;
        };
        tx.execute(
            "INSERT INTO unique_keys (entity_type, key_name, key_value, entity_uuid)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                metadata.name.as_str(),
                key.name.as_str(),
                value,
                entity.uuid.to_string()
            ],
        )
        .map_err(|err| write_error(err, &metadata.name, &key.name))?;
    }
    Ok(())
}

/// Loads one page of `owning_type` rows matching `query`.
///
/// Type and id always filter in SQL, and so does paging when the query has
/// neither criteria nor ordering. Criteria compare decoded payloads, so a
/// filtered query reads the type's rows in insertion order and, when
/// unordered, stops once its page is full. Ordered queries decode every
/// match before sorting.
fn select_rows(
    conn: &rusqlite::Connection,
    owning_type: &str,
    query: &RowQuery,
) -> EngineResult<Vec<RawRow>> {
    let unordered = query.order_by.is_empty();
    let paged_in_sql = unordered && query.criteria.is_empty();
    let (sql_limit, sql_offset) = if paged_in_sql {
        (query.limit.map_or(-1, i64::from), i64::from(query.offset))
    } else {
        (-1, 0)
    };
    let mut to_skip = if paged_in_sql { 0 } else { query.offset };

    let mut stmt = conn.prepare(
        "SELECT uuid, entity_type, runtime_type, payload
         FROM entities
         WHERE entity_type = ?1
           AND (?2 IS NULL OR uuid = ?2)
         ORDER BY rowid ASC
         LIMIT ?3 OFFSET ?4;",
    )?;
    let mut rows = stmt.query(params![
        owning_type,
        query.id.map(|id| id.to_string()),
        sql_limit,
        sql_offset
    ])?;
    let mut loaded = Vec::new();

    while let Some(row) = rows.next()? {
        if unordered && query.limit.is_some_and(|limit| loaded.len() >= limit as usize) {
            break;
        }
        let row = decode_row(row)?;
        if !matches_criteria(&row, &query.criteria) {
            continue;
        }
        if unordered && to_skip > 0 {
            to_skip -= 1;
            continue;
        }
        loaded.push(row);
    }

    if unordered {
        return Ok(loaded);
    }
    sort_rows(&mut loaded, &query.order_by);
    Ok(loaded
        .into_iter()
        .skip(query.offset as usize)
        .take(query.limit.map_or(usize::MAX, |limit| limit as usize))
        .collect())
}

fn decode_row(row: &rusqlite::Row<'_>) -> EngineResult<RawRow> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = Uuid::parse_str(&uuid_text).map_err(|_| {
        EngineError::InvalidData(format!("invalid uuid value `{uuid_text}` in entities.uuid"))
    })?;
    let payload: String = row.get("payload")?;
    let fields: BTreeMap<String, FieldValue> = serde_json::from_str(&payload).map_err(|err| {
        EngineError::InvalidData(format!("invalid payload for entity {uuid}: {err}"))
    })?;

    Ok(RawRow {
        uuid,
        entity_type: row.get("entity_type")?,
        runtime_type: row.get("runtime_type")?,
        fields,
    })
}

fn matches_criteria(row: &RawRow, criteria: &Criteria) -> bool {
    criteria.iter().all(|(name, expected)| match row.fields.get(name) {
        Some(actual) => actual == expected,
        None => expected.is_null(),
    })
}

fn sort_rows(rows: &mut [RawRow], order_by: &[(String, SortOrder)]) {
    if order_by.is_empty() {
        return;
    }
    rows.sort_by(|left, right| {
        for (field, direction) in order_by {
            let ordering = field_or_null(left, field).sort_cmp(field_or_null(right, field));
            let ordering = match direction {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            };
            if ordering.is_ne() {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn field_or_null<'row>(row: &'row RawRow, field: &str) -> &'row FieldValue {
    const NULL: &FieldValue = &FieldValue::Null;
    row.fields.get(field).unwrap_or(NULL)
}

fn encode_payload(entity: &EntityRecord) -> EngineResult<String> {
    serde_json::to_string(&entity.fields).map_err(|err| {
        EngineError::InvalidData(format!("cannot encode entity {}: {err}", entity.uuid))
    })
}

fn encode_key_value(entity: &EntityRecord, key: &UniqueKey) -> EngineResult<Option<String>> {
    let Some(criteria) = key.criteria_for(entity) else {
        return Ok(None);
    };
    let values: Vec<&FieldValue> = key
        .fields
        .iter()
        .filter_map(|field| criteria.get(field))
        .collect();
    serde_json::to_string(&values).map(Some).map_err(|err| {
        EngineError::InvalidData(format!(
            "cannot encode unique key `{}` of entity {}: {err}",
            key.name, entity.uuid
        ))
    })
}

fn write_error(err: rusqlite::Error, entity_type: &str, key: &str) -> EngineError {
    if is_unique_violation(&err) {
        return EngineError::DuplicateKey {
            entity_type: entity_type.to_string(),
            key: key.to_string(),
        };
    }
    err.into()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == ErrorCode::ConstraintViolation
                && (inner.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || inner.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}
