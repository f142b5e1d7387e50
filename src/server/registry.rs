//! Session registry: unique handle → live session
//!
//! All methods run under the router's lock, so register/lookup/remove are
//! linearizable: a lookup after a successful register observes it, and a
//! remove makes the handle immediately available again.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::{RelayError, Result};
use crate::server::session::SessionHandle;

/// Mapping from registered handle to session, one entry per live connection
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Atomic check-and-insert. A colliding handle (case-sensitive exact
    /// match) is rejected and never mutates the map.
    pub fn register(&mut self, handle: &str, session: SessionHandle) -> Result<()> {
        if self.sessions.contains_key(handle) {
            return Err(RelayError::duplicate_handle(handle));
        }
        self.sessions.insert(handle.to_string(), session);
        Ok(())
    }

    pub fn lookup(&self, handle: &str) -> Option<&SessionHandle> {
        self.sessions.get(handle)
    }

    /// Remove the entry for `handle` if it is still owned by `conn_id`.
    ///
    /// Idempotent; the owner check keeps a late cleanup from evicting a new
    /// session that re-registered the handle in the meantime.
    pub fn remove(&mut self, handle: &str, conn_id: Uuid) -> bool {
        match self.sessions.get(handle) {
            Some(session) if session.conn_id() == conn_id => {
                self.sessions.remove(handle);
                true
            }
            _ => false,
        }
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
