//! Shared connection handle.
//!
//! One `Connection` owns one SQLite handle and the event dispatcher that
//! lifecycle listeners are attached to. The dispatcher is fixed at open time;
//! `Arc` identity is what the facade compares when checking for a mismatch.

use super::open::open_with_params;
use super::{DbError, DbResult};
use crate::config::ConnectionParams;
use crate::event::EventDispatcher;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex};

pub struct Connection {
    inner: Mutex<rusqlite::Connection>,
    params: ConnectionParams,
    event_dispatcher: Arc<EventDispatcher>,
}

impl Connection {
    /// Opens and migrates a database, binding it to `event_dispatcher`.
    pub fn open(params: ConnectionParams, event_dispatcher: Arc<EventDispatcher>) -> DbResult<Self> {
        let inner = open_with_params(&params)?;
        Ok(Self {
            inner: Mutex::new(inner),
            params,
            event_dispatcher,
        })
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn event_dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.event_dispatcher
    }

    /// Runs `f` with exclusive access to the underlying SQLite handle.
    pub fn with_conn<T, E>(
        &self,
        f: impl FnOnce(&mut rusqlite::Connection) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<DbError>,
    {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| DbError::LockPoisoned("connection access"))?;
        f(&mut guard)
    }
}

impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
