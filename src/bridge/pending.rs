//! Pending connect table
//!
//! Between issuing an outbound connect and its completion the only thing
//! the completion carries is the socket: its identity and the address it
//! was connecting to. This table recovers the originating session from
//! those. Entries are keyed by upstream address, and many sessions may be
//! pending on the same address at once.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use super::registry::SessionId;
use crate::common::{ProxyError, Result};
use crate::reactor::Token;

/// One outstanding connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingConnect {
    /// Session that issued the connect
    pub session: SessionId,
    /// Socket the connect runs on
    pub token: Token,
}

/// Multi-map from upstream address to sessions waiting on a connect
#[derive(Debug, Default)]
pub struct PendingConnectTable {
    entries: BTreeMap<SocketAddr, Vec<PendingConnect>>,
    len: usize,
}

impl PendingConnectTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connect to `addr` issued by `session` on socket `token`
    pub fn insert(&mut self, addr: SocketAddr, session: SessionId, token: Token) {
        self.entries
            .entry(addr)
            .or_default()
            .push(PendingConnect { session, token });
        self.len += 1;
    }

    /// Remove and return the session whose connect to `peer` ran on `token`
    ///
    /// A miss means a connect completed that nobody issued, which is a
    /// logic error: the caller must not keep relaying.
    pub fn take_match(&mut self, peer: SocketAddr, token: Token) -> Result<SessionId> {
        let bucket = self
            .entries
            .get_mut(&peer)
            .ok_or(ProxyError::UnmatchedConnect { peer, token })?;
        let index = bucket
            .iter()
            .position(|entry| entry.token == token)
            .ok_or(ProxyError::UnmatchedConnect { peer, token })?;

        let entry = bucket.swap_remove(index);
        if bucket.is_empty() {
            self.entries.remove(&peer);
        }
        self.len -= 1;
        Ok(entry.session)
    }

    /// Drop the entry of `session` for `addr`, if any
    ///
    /// Used when a connecting session is torn down before its connect
    /// completes.
    pub fn remove_session(&mut self, addr: SocketAddr, session: SessionId) -> bool {
        let Some(bucket) = self.entries.get_mut(&addr) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|entry| entry.session != session);
        let removed = before - bucket.len();
        if bucket.is_empty() {
            self.entries.remove(&addr);
        }
        self.len -= removed;
        removed > 0
    }

    /// Number of pending connects to `addr`
    pub fn count_for(&self, addr: SocketAddr) -> usize {
        self.entries.get(&addr).map_or(0, Vec::len)
    }

    /// Whether `session` has a pending connect to `addr`
    pub fn contains(&self, addr: SocketAddr, session: SessionId) -> bool {
        self.entries
            .get(&addr)
            .is_some_and(|bucket| bucket.iter().any(|entry| entry.session == session))
    }

    /// Total number of pending connects
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no connect is pending
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Forget every pending connect
    pub fn clear(&mut self) {
        self.entries.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream() -> SocketAddr {
        "10.0.0.5:80".parse().unwrap()
    }

    #[test]
    fn test_duplicate_addresses_allowed() {
        let mut table = PendingConnectTable::new();
        table.insert(upstream(), SessionId(1), Token(10));
        table.insert(upstream(), SessionId(2), Token(20));

        assert_eq!(table.len(), 2);
        assert_eq!(table.count_for(upstream()), 2);
        assert!(table.contains(upstream(), SessionId(1)));
        assert!(table.contains(upstream(), SessionId(2)));
    }

    #[test]
    fn test_take_match_by_socket() {
        let mut table = PendingConnectTable::new();
        table.insert(upstream(), SessionId(1), Token(10));
        table.insert(upstream(), SessionId(2), Token(20));

        assert_eq!(table.take_match(upstream(), Token(20)).unwrap(), SessionId(2));
        assert!(!table.contains(upstream(), SessionId(2)));
        assert_eq!(table.take_match(upstream(), Token(10)).unwrap(), SessionId(1));
        assert!(table.is_empty());
        assert_eq!(table.count_for(upstream()), 0);
    }

    #[test]
    fn test_take_match_miss_is_error() {
        let mut table = PendingConnectTable::new();
        table.insert(upstream(), SessionId(1), Token(10));

        // Unknown address
        let err = table.take_match("10.0.0.6:80".parse().unwrap(), Token(10)).unwrap_err();
        assert!(matches!(err, ProxyError::UnmatchedConnect { .. }));

        // Known address, unknown socket
        let err = table.take_match(upstream(), Token(11)).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(table.len(), 1, "A miss must leave the table unchanged");
    }

    #[test]
    fn test_take_match_removes_exactly_once() {
        let mut table = PendingConnectTable::new();
        table.insert(upstream(), SessionId(1), Token(10));

        assert!(table.take_match(upstream(), Token(10)).is_ok());
        assert!(table.take_match(upstream(), Token(10)).is_err());
    }

    #[test]
    fn test_remove_session() {
        let mut table = PendingConnectTable::new();
        table.insert(upstream(), SessionId(1), Token(10));
        table.insert(upstream(), SessionId(2), Token(20));

        assert!(table.remove_session(upstream(), SessionId(1)));
        assert!(!table.remove_session(upstream(), SessionId(1)));
        assert_eq!(table.len(), 1);

        table.clear();
        assert!(table.is_empty());
    }
}
