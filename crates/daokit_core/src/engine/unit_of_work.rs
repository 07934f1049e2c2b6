//! Ordered change scheduling for the SQLite engine.
//!
//! # Responsibility
//! - Keep pending inserts, updates and removals in call order.
//! - Track which entity IDs are managed (flushed or loaded).
//!
//! # Invariants
//! - At most one pending change exists per entity ID.
//! - Changes taken for a flush are either marked flushed or restored ahead of
//!   anything scheduled since.

use crate::model::entity::{EntityId, EntityRecord};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub kind: ChangeKind,
    pub owning_type: String,
    pub entity: EntityRecord,
}

#[derive(Debug, Default)]
pub struct UnitOfWork {
    pending: Vec<PendingChange>,
    managed: HashMap<EntityId, String>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an insert, or an update for already managed entities.
    ///
    /// Persisting an entity with a pending removal cancels the removal.
    pub fn schedule_persist(&mut self, owning_type: &str, entity: &EntityRecord) {
        if let Some(position) = self.position_of(entity.uuid) {
            let change = &mut self.pending[position];
            if change.kind == ChangeKind::Delete {
                self.pending.remove(position);
            } else {
                change.entity = entity.clone();
            }
            return;
        }

        let kind = if self.managed.contains_key(&entity.uuid) {
            ChangeKind::Update
        } else {
            ChangeKind::Insert
        };
        self.pending.push(PendingChange {
            kind,
            owning_type: owning_type.to_string(),
            entity: entity.clone(),
        });
    }

    /// Schedules a removal.
    ///
    /// Removing an entity whose insert is still pending just unschedules the
    /// insert; removing an untracked entity is a no-op here. Callers decide
    /// whether an untracked entity is new or detached.
    pub fn schedule_remove(&mut self, owning_type: &str, entity: &EntityRecord) {
        if let Some(position) = self.position_of(entity.uuid) {
            match self.pending[position].kind {
                ChangeKind::Insert => {
                    self.pending.remove(position);
                    return;
                }
                ChangeKind::Delete => return,
                ChangeKind::Update => {
                    self.pending.remove(position);
                }
            }
        }

        if self.managed.contains_key(&entity.uuid) {
            self.pending.push(PendingChange {
                kind: ChangeKind::Delete,
                owning_type: owning_type.to_string(),
                entity: entity.clone(),
            });
        }
    }

    /// Takes pending changes for a flush: all, or only those of `entity_id`.
    pub fn take(&mut self, entity_id: Option<EntityId>) -> Vec<PendingChange> {
        match entity_id {
            None => std::mem::take(&mut self.pending),
            Some(id) => {
                let (taken, kept) = std::mem::take(&mut self.pending)
                    .into_iter()
                    .partition(|change| change.entity.uuid == id);
                self.pending = kept;
                taken
            }
        }
    }

    /// Puts changes from a failed flush back in front of the queue.
    pub fn restore(&mut self, mut changes: Vec<PendingChange>) {
        changes.append(&mut self.pending);
        self.pending = changes;
    }

    pub fn mark_flushed(&mut self, changes: &[PendingChange]) {
        for change in changes {
            match change.kind {
                ChangeKind::Insert | ChangeKind::Update => {
                    self.managed
                        .insert(change.entity.uuid, change.owning_type.clone());
                }
                ChangeKind::Delete => {
                    self.managed.remove(&change.entity.uuid);
                }
            }
        }
    }

    pub fn register_managed(&mut self, entity_id: EntityId, owning_type: &str) {
        self.managed
            .entry(entity_id)
            .or_insert_with(|| owning_type.to_string());
    }

    pub fn detach(&mut self, entity_id: EntityId) {
        self.pending.retain(|change| change.entity.uuid != entity_id);
        self.managed.remove(&entity_id);
    }

    /// Drops pending and managed state for one owning type, or everything.
    pub fn clear(&mut self, owning_type: Option<&str>) {
        match owning_type {
            None => {
                self.pending.clear();
                self.managed.clear();
            }
            Some(owning_type) => {
                self.pending
                    .retain(|change| change.owning_type != owning_type);
                self.managed.retain(|_, managed_type| managed_type != owning_type);
            }
        }
    }

    pub fn is_managed(&self, entity_id: EntityId) -> bool {
        self.managed.contains_key(&entity_id)
    }

    /// Managed, or carrying a pending change.
    pub fn tracks(&self, entity_id: EntityId) -> bool {
        self.is_managed(entity_id) || self.position_of(entity_id).is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn position_of(&self, entity_id: EntityId) -> Option<usize> {
        self.pending
            .iter()
            .position(|change| change.entity.uuid == entity_id)
    }
}
