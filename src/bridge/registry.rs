//! Session registry
//!
//! The registry is the single owner of every live session. Everything else,
//! including reactor callbacks, refers to a session by its [`SessionId`] and
//! resolves it here when the callback fires; a session that is no longer
//! registered simply does not resolve.

use log::debug;
use std::collections::HashMap;
use std::fmt;

use super::session::Session;

/// Non-owning handle to a registered session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Collection of all live sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    next_id: u64,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `session` and return its handle
    pub fn register(&mut self, session: Session) -> SessionId {
        self.next_id += 1;
        let id = SessionId(self.next_id);
        self.sessions.insert(id, session);
        id
    }

    /// Give up ownership of a session
    pub fn unregister(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    /// Resolve a handle
    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Resolve a handle for mutation
    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Tear down and unregister every session
    ///
    /// No draining: bytes still buffered are dropped. Returns how many
    /// sessions were torn down.
    pub fn clear(&mut self) -> usize {
        let count = self.sessions.len();
        for (id, mut session) in self.sessions.drain() {
            debug!("Tearing down {} ({}) for shutdown", id, session.phase());
            session.teardown();
        }
        count
    }
}
