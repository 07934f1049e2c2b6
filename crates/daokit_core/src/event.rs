//! Lifecycle event dispatcher.
//!
//! # Responsibility
//! - Hold lifecycle listeners attached to one connection.
//! - Invoke listeners synchronously, in registration order per event.
//!
//! # Invariants
//! - Listeners must not register new listeners on the same dispatcher from
//!   inside a callback (the listener table is read-locked during dispatch).
//! - A poisoned listener table is still dispatched; a panicking listener does
//!   not disable the others.

use crate::model::entity::EntityRecord;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::{PoisonError, RwLock};

/// Lifecycle points reported by the persistence engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleEvent {
    /// An entity was scheduled for insertion or update.
    PrePersist,
    /// A scheduled insertion or update was committed.
    PostPersist,
    /// An entity was scheduled for removal.
    PreRemove,
    /// A scheduled removal was committed.
    PostRemove,
    /// A flush completed.
    PostFlush,
    /// Managed state was cleared, for one type or for all.
    OnClear,
}

/// Payload passed to lifecycle listeners.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleEventArgs<'a> {
    pub event: LifecycleEvent,
    pub entity: Option<&'a EntityRecord>,
    /// Owning type for per-type events; `None` means all types.
    pub entity_type: Option<&'a str>,
}

impl<'a> LifecycleEventArgs<'a> {
    pub fn for_entity(event: LifecycleEvent, entity: &'a EntityRecord) -> Self {
        Self {
            event,
            entity: Some(entity),
            entity_type: Some(entity.real_type()),
        }
    }

    pub fn for_type(event: LifecycleEvent, entity_type: Option<&'a str>) -> Self {
        Self {
            event,
            entity: None,
            entity_type,
        }
    }
}

type Listener = Box<dyn Fn(&LifecycleEventArgs<'_>) + Send + Sync>;

/// Multicast registry of lifecycle listeners.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<BTreeMap<LifecycleEvent, Vec<Listener>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(
        &self,
        event: LifecycleEvent,
        listener: impl Fn(&LifecycleEventArgs<'_>) + Send + Sync + 'static,
    ) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event)
            .or_default()
            .push(Box::new(listener));
    }

    pub fn has_listeners(&self, event: LifecycleEvent) -> bool {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event)
            .is_some_and(|listeners| !listeners.is_empty())
    }

    pub fn dispatch(&self, args: &LifecycleEventArgs<'_>) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(registered) = listeners.get(&args.event) {
            for listener in registered {
                listener(args);
            }
        }
    }
}

impl Debug for EventDispatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        let counts: BTreeMap<_, _> = listeners
            .iter()
            .map(|(event, registered)| (*event, registered.len()))
            .collect();
        f.debug_struct("EventDispatcher")
            .field("listeners", &counts)
            .finish()
    }
}
