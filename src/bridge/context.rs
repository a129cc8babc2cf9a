//! Bridge context
//!
//! The context is the one place session state lives: the registry that
//! owns the sessions, the pending connect table, and the bindings that map
//! a socket to the session side it belongs to. A single dispatcher owns the
//! context and feeds it every reactor event, so no state is ever touched
//! from two places at once.

use log::{debug, error, info, trace, warn};
use metrics::{counter, gauge};
use std::collections::HashMap;
use std::net::SocketAddr;

use super::pending::PendingConnectTable;
use super::registry::{SessionId, SessionRegistry};
use super::session::{Phase, Session, Side};
use crate::common::Result;
use crate::reactor::{EventKind, Reactor, ReactorEvent, Token};

/// Runtime counters of a bridge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyStats {
    /// Sessions currently registered
    pub active_sessions: usize,
    /// Outbound connects not yet completed
    pub pending_connects: usize,
    /// Sessions created since start
    pub sessions_total: u64,
    /// Outbound connects that failed
    pub connect_failures: u64,
    /// Bytes relayed from clients to the upstream
    pub bytes_to_upstream: u64,
    /// Bytes relayed from the upstream to clients
    pub bytes_to_client: u64,
}

/// Session side a socket is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Binding {
    session: SessionId,
    side: Side,
}

/// Shared state of all sessions of one proxy
pub struct BridgeContext<R: Reactor> {
    reactor: R,
    upstream: SocketAddr,
    registry: SessionRegistry,
    pending: PendingConnectTable,
    bindings: HashMap<Token, Binding>,
    stats: ProxyStats,
}

impl<R: Reactor> BridgeContext<R> {
    /// Create a context relaying to `upstream`
    pub fn new(reactor: R, upstream: SocketAddr) -> Self {
        Self {
            reactor,
            upstream,
            registry: SessionRegistry::new(),
            pending: PendingConnectTable::new(),
            bindings: HashMap::new(),
            stats: ProxyStats::default(),
        }
    }

    /// Upstream every session relays to
    pub fn upstream(&self) -> SocketAddr {
        self.upstream
    }

    /// Live sessions
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Outstanding connects
    pub fn pending(&self) -> &PendingConnectTable {
        &self.pending
    }

    /// The reactor
    pub fn reactor(&self) -> &R {
        &self.reactor
    }

    /// Current counters
    pub fn stats(&self) -> ProxyStats {
        ProxyStats {
            active_sessions: self.registry.len(),
            pending_connects: self.pending.len(),
            ..self.stats
        }
    }

    /// A client connection was accepted
    ///
    /// Creates and registers a session and starts its outbound connect.
    /// Failures only cost this session.
    pub fn on_accept(&mut self, socket: R::Socket, client_addr: SocketAddr) -> Option<SessionId> {
        let client = match self.reactor.attach(socket) {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to set up session for {}: {}", client_addr, e);
                return None;
            }
        };

        let id = self.registry.register(Session::create(client, client_addr, self.upstream));
        self.stats.sessions_total += 1;
        counter!("bridge.sessions.total").increment(1);
        gauge!("bridge.sessions.active").set(self.registry.len() as f64);
        debug!("Accepted {} as {}", client_addr, id);

        let started = match self.registry.get_mut(id) {
            Some(session) => session.start(id, &mut self.reactor, &mut self.pending),
            None => return None,
        };
        if let Err(e) = started {
            warn!("Client failed to connect to {}: {}", self.upstream, e);
            self.record_connect_failure();
            self.teardown(id);
            return None;
        }
        Some(id)
    }

    /// Handle one reactor event
    ///
    /// Only an invariant violation is returned as an error; the caller must
    /// stop serving when that happens.
    pub fn dispatch(&mut self, event: ReactorEvent) -> Result<()> {
        match event {
            ReactorEvent::Connected { token, peer, local, result } => {
                self.on_upstream_connected(token, peer, local, result)?;
            }
            ReactorEvent::Readable { token, data } => {
                let Some((id, side)) = self.resolve(token) else {
                    return Ok(());
                };
                if let Some(session) = self.registry.get_mut(id) {
                    session.on_readable(side, &data);
                }
                self.record_relayed(side, data.len());
            }
            ReactorEvent::Writable { token } => {
                if let Some((id, side)) = self.resolve(token) {
                    if let Some(session) = self.registry.get_mut(id) {
                        session.on_writable(side);
                    }
                }
            }
            ReactorEvent::Event { token, kind, error } => {
                let Some((id, side)) = self.resolve(token) else {
                    return Ok(());
                };
                if let (EventKind::Error, Some(e)) = (kind, error.as_ref()) {
                    debug!("{} {} error: {}", id, side, e);
                }
                if let Some(session) = self.registry.get_mut(id) {
                    session.on_event(side, kind);
                }
                self.teardown(id);
            }
        }
        Ok(())
    }

    fn on_upstream_connected(
        &mut self,
        token: Token,
        peer: SocketAddr,
        local: Option<SocketAddr>,
        result: std::io::Result<()>,
    ) -> Result<()> {
        let id = match self.pending.take_match(peer, token) {
            Ok(id) => id,
            Err(e) => {
                error!("Connect completion from {} on {} has no pending session", peer, token);
                return Err(e);
            }
        };

        let connected = result.is_ok();
        let Some(session) = self.registry.get_mut(id) else {
            debug!("{} finished connecting after teardown", id);
            return Ok(());
        };

        if session.on_upstream_connected(result) {
            for (token, side) in session.tokens() {
                self.bindings.insert(token, Binding { session: id, side });
            }
            if let Some(local) = local {
                trace!("{} upstream leg bound to {}", id, local);
            }
        } else {
            if !connected {
                self.record_connect_failure();
            }
            self.teardown(id);
        }
        Ok(())
    }

    /// Tear a session down and forget it
    ///
    /// Safe to call any number of times for the same session, in any phase.
    /// Returns whether this call removed the session.
    pub fn teardown(&mut self, id: SessionId) -> bool {
        let Some(mut session) = self.registry.unregister(id) else {
            return false;
        };

        if session.phase() == Phase::Connecting {
            self.pending.remove_session(session.upstream_addr(), id);
        }
        for (token, _) in session.tokens() {
            self.bindings.remove(&token);
        }
        session.teardown();

        gauge!("bridge.sessions.active").set(self.registry.len() as f64);
        debug!("{} removed, {} sessions active", id, self.registry.len());
        true
    }

    /// Tear down every session without draining
    ///
    /// Returns how many sessions were torn down.
    pub fn shutdown(&mut self) -> usize {
        let count = self.registry.clear();
        self.pending.clear();
        self.bindings.clear();
        gauge!("bridge.sessions.active").set(0.0);
        info!("Tore down {} sessions", count);
        count
    }

    fn resolve(&self, token: Token) -> Option<(SessionId, Side)> {
        match self.bindings.get(&token) {
            Some(binding) => Some((binding.session, binding.side)),
            None => {
                trace!("Ignoring event for unbound socket {}", token);
                None
            }
        }
    }

    fn record_relayed(&mut self, source: Side, bytes: usize) {
        let bytes = bytes as u64;
        match source {
            Side::Client => {
                self.stats.bytes_to_upstream += bytes;
                counter!("bridge.bytes.to_upstream").increment(bytes);
            }
            Side::Upstream => {
                self.stats.bytes_to_client += bytes;
                counter!("bridge.bytes.to_client").increment(bytes);
            }
        }
    }

    fn record_connect_failure(&mut self) {
        self.stats.connect_failures += 1;
        counter!("bridge.connect.failures").increment(1);
    }
}
