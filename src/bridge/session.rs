//! Session: one client-to-upstream relay
//!
//! A session owns exactly two endpoints and is the only thing that reads or
//! writes them. Relaying throttles at the source: after a chunk is copied
//! to the peer, the source stops reading until the peer reports the chunk
//! flushed. That keeps at most one unflushed chunk per direction.

use log::{debug, info, warn};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use super::endpoint::Endpoint;
use super::pending::PendingConnectTable;
use super::registry::SessionId;
use crate::reactor::{EventKind, Reactor, SocketOptions, Token, Transport};

/// Connection phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Client accepted, nothing started yet
    Created,
    /// Outbound connect in progress
    Connecting,
    /// Relaying in both directions
    Established,
    /// Both endpoints closed; terminal
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Connecting => write!(f, "connecting"),
            Self::Established => write!(f, "established"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Which endpoint of a session an event concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The accepted client socket
    Client,
    /// The outbound socket to the upstream
    Upstream,
}

impl Side {
    /// The other side
    pub fn peer(self) -> Side {
        match self {
            Self::Client => Self::Upstream,
            Self::Upstream => Self::Client,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Upstream => write!(f, "upstream"),
        }
    }
}

/// Paired client and upstream relay for one accepted connection
pub struct Session {
    client_addr: SocketAddr,
    upstream_addr: SocketAddr,
    client: Endpoint,
    upstream: Option<Endpoint>,
    phase: Phase,
    bytes_to_upstream: u64,
    bytes_to_client: u64,
    created_at: Instant,
}

impl Session {
    /// Create a session for an accepted client socket
    ///
    /// The session has no upstream endpoint until [`Session::start`].
    pub fn create(
        client: Box<dyn Transport>,
        client_addr: SocketAddr,
        upstream_addr: SocketAddr,
    ) -> Self {
        Self {
            client_addr,
            upstream_addr,
            client: Endpoint::new(client),
            upstream: None,
            phase: Phase::Created,
            bytes_to_upstream: 0,
            bytes_to_client: 0,
            created_at: Instant::now(),
        }
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Address of the client
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Address of the upstream
    pub fn upstream_addr(&self) -> SocketAddr {
        self.upstream_addr
    }

    /// Client endpoint
    pub fn client(&self) -> &Endpoint {
        &self.client
    }

    /// Upstream endpoint, once the connect was issued
    pub fn upstream(&self) -> Option<&Endpoint> {
        self.upstream.as_ref()
    }

    /// Endpoint on `side`
    pub fn endpoint(&self, side: Side) -> Option<&Endpoint> {
        match side {
            Side::Client => Some(&self.client),
            Side::Upstream => self.upstream.as_ref(),
        }
    }

    /// Tokens of both endpoints with their sides
    pub fn tokens(&self) -> Vec<(Token, Side)> {
        let mut tokens = vec![(self.client.token(), Side::Client)];
        if let Some(upstream) = &self.upstream {
            tokens.push((upstream.token(), Side::Upstream));
        }
        tokens
    }

    /// Bytes relayed client to upstream, and upstream to client
    pub fn bytes_relayed(&self) -> (u64, u64) {
        (self.bytes_to_upstream, self.bytes_to_client)
    }

    /// Issue the outbound connect
    ///
    /// Registers the session in `pending` under the upstream address for the
    /// duration of the connect. An error means the connect could not be
    /// initiated; the caller tears the session down.
    pub fn start<R: Reactor>(
        &mut self,
        id: SessionId,
        reactor: &mut R,
        pending: &mut PendingConnectTable,
    ) -> io::Result<()> {
        if self.phase != Phase::Created {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("session {} cannot start while {}", id, self.phase),
            ));
        }
        self.phase = Phase::Connecting;

        let transport = reactor.connect(self.upstream_addr)?;
        pending.insert(self.upstream_addr, id, transport.token());
        debug!(
            "Initiated connection {} <-> {} on {}",
            self.client_addr,
            self.upstream_addr,
            transport.token()
        );
        self.upstream = Some(Endpoint::new(transport));
        Ok(())
    }

    /// The outbound connect completed
    ///
    /// On success both endpoints start relaying; on failure the session is
    /// torn down. Returns whether the session is now established.
    pub fn on_upstream_connected(&mut self, result: io::Result<()>) -> bool {
        if self.phase != Phase::Connecting {
            return false;
        }

        if let Err(e) = result {
            warn!("Upstream connection to {} failed: {}", self.upstream_addr, e);
            self.teardown();
            return false;
        }
        let Some(upstream) = self.upstream.as_mut() else {
            warn!("Connect completed for {} without an upstream endpoint", self.client_addr);
            self.teardown();
            return false;
        };

        for endpoint in [&mut self.client, upstream] {
            endpoint.configure(SocketOptions::RELAY);
            endpoint.enable_write();
            endpoint.enable_read();
        }
        self.phase = Phase::Established;
        info!("Connected {} <-> {}", self.client_addr, self.upstream_addr);
        true
    }

    /// A chunk was read on `side`: relay it to the peer and stop reading
    pub fn on_readable(&mut self, side: Side, data: &[u8]) {
        if self.phase != Phase::Established {
            return;
        }
        let Some((source, peer)) = self.pair_mut(side) else {
            return;
        };

        source.receive(data);
        let chunk = source.take_input();
        peer.queue_output(&chunk);
        source.disable_read();

        match side {
            Side::Client => self.bytes_to_upstream += chunk.len() as u64,
            Side::Upstream => self.bytes_to_client += chunk.len() as u64,
        }
    }

    /// Output on `side` was flushed: let its peer read again
    pub fn on_writable(&mut self, side: Side) {
        if self.phase != Phase::Established {
            return;
        }
        let Some((flushed, feeder)) = self.pair_mut(side) else {
            return;
        };

        flushed.on_flushed();
        if flushed.unflushed() == 0 {
            feeder.enable_read();
        }
    }

    /// Error, EOF or timeout on `side` ends the whole session
    pub fn on_event(&mut self, side: Side, kind: EventKind) {
        match kind {
            EventKind::EndOfFile => debug!("{} {} closed the connection", side, self.peer_addr(side)),
            EventKind::Error | EventKind::Timeout => {
                warn!("{} connection {} reported {}", side, self.peer_addr(side), kind)
            }
        }
        self.teardown();
    }

    /// Close both endpoints
    ///
    /// Idempotent: returns `false` when the session was already closed.
    pub fn teardown(&mut self) -> bool {
        if self.phase == Phase::Closed {
            return false;
        }
        self.phase = Phase::Closed;

        self.client.close();
        if let Some(upstream) = self.upstream.as_mut() {
            upstream.close();
        }

        debug!(
            "Closed {} <-> {} after {} ms: {} bytes up, {} bytes down",
            self.client_addr,
            self.upstream_addr,
            self.created_at.elapsed().as_millis(),
            self.bytes_to_upstream,
            self.bytes_to_client
        );
        true
    }

    fn peer_addr(&self, side: Side) -> SocketAddr {
        match side {
            Side::Client => self.client_addr,
            Side::Upstream => self.upstream_addr,
        }
    }

    /// Endpoint on `side` together with its peer
    fn pair_mut(&mut self, side: Side) -> Option<(&mut Endpoint, &mut Endpoint)> {
        let upstream = self.upstream.as_mut()?;
        Some(match side {
            Side::Client => (&mut self.client, upstream),
            Side::Upstream => (upstream, &mut self.client),
        })
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("client_addr", &self.client_addr)
            .field("upstream_addr", &self.upstream_addr)
            .field("phase", &self.phase)
            .field("client", &self.client)
            .field("upstream", &self.upstream)
            .finish()
    }
}
