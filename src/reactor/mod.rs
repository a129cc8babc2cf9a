//! Reactor interface
//!
//! The bridge core never performs I/O itself. It issues commands to a
//! [`Transport`] (one per socket) and reacts to [`ReactorEvent`]s that the
//! reactor delivers back to a single dispatcher. The production reactor is
//! [`TokioReactor`]; tests drive the core with a scripted fake.

mod driver;

pub use self::driver::{DriverSettings, TokioReactor};

use bytes::Bytes;
use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Identity of one registered socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u64);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Terminal condition reported on an established socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Read or write failed
    Error,
    /// Peer closed its side
    EndOfFile,
    /// No activity within the idle timeout
    Timeout,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::EndOfFile => write!(f, "EOF"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Socket options applied once a relay is established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOptions {
    /// Disable Nagle's algorithm
    pub nodelay: bool,
    /// Enable TCP keep-alive probes
    pub keepalive: bool,
}

impl SocketOptions {
    /// Options used on both legs of an established relay
    pub const RELAY: SocketOptions = SocketOptions { nodelay: true, keepalive: true };
}

/// Event delivered by the reactor to the dispatcher
#[derive(Debug)]
pub enum ReactorEvent {
    /// An outbound connect finished, successfully or not
    Connected {
        /// Socket that was connecting
        token: Token,
        /// Address the socket was connecting to
        peer: SocketAddr,
        /// Local address, when the connect succeeded
        local: Option<SocketAddr>,
        /// Outcome of the connect
        result: io::Result<()>,
    },
    /// A chunk was read while read interest was enabled
    Readable {
        /// Socket the chunk was read from
        token: Token,
        /// The chunk
        data: Bytes,
    },
    /// Everything previously handed to [`Transport::write`] reached the wire
    Writable {
        /// Socket whose output drained
        token: Token,
    },
    /// Error, EOF or timeout
    Event {
        /// Socket the condition was observed on
        token: Token,
        /// Kind of condition
        kind: EventKind,
        /// Underlying error, for [`EventKind::Error`]
        error: Option<io::Error>,
    },
}

impl ReactorEvent {
    /// Socket this event concerns
    pub fn token(&self) -> Token {
        match self {
            Self::Connected { token, .. }
            | Self::Readable { token, .. }
            | Self::Writable { token }
            | Self::Event { token, .. } => *token,
        }
    }
}

/// One socket registered with the reactor
///
/// Read interest is one-shot: after a [`ReactorEvent::Readable`] is
/// delivered, no further chunk is read until interest is enabled again.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    /// Identity used in events for this socket
    fn token(&self) -> Token;

    /// Arm or disarm reading
    fn set_read_interest(&mut self, enabled: bool);

    /// Queue bytes for writing; [`ReactorEvent::Writable`] follows once flushed
    fn write(&mut self, data: Bytes);

    /// Apply socket options
    fn configure(&mut self, options: SocketOptions);

    /// Close the socket; closing twice is a no-op
    fn close(&mut self);
}

/// Socket factory and event source of the bridge core
pub trait Reactor {
    /// Socket type produced by the acceptor
    type Socket;

    /// Register an accepted socket with read interest disabled
    fn attach(&mut self, socket: Self::Socket) -> io::Result<Box<dyn Transport>>;

    /// Create a socket and start a non-blocking connect to `addr`
    ///
    /// An error means the connect could not even be initiated. Otherwise a
    /// [`ReactorEvent::Connected`] for the returned transport follows.
    fn connect(&mut self, addr: SocketAddr) -> io::Result<Box<dyn Transport>>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted reactor for driving the core without sockets

    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Command observed on a fake transport
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Op {
        ReadInterest(bool),
        Write(Bytes),
        Configure(SocketOptions),
        Close,
    }

    #[derive(Default)]
    struct Journal {
        ops: Vec<(Token, Op)>,
        connects: Vec<(Token, SocketAddr)>,
        refuse_connect: VecDeque<io::ErrorKind>,
    }

    /// Reactor that records commands instead of doing I/O
    #[derive(Clone, Default)]
    pub struct FakeReactor {
        journal: Arc<Mutex<Journal>>,
        next_token: Arc<Mutex<u64>>,
    }

    impl FakeReactor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `connect` call fail to initiate
        pub fn refuse_next_connect(&self, kind: io::ErrorKind) {
            self.journal.lock().unwrap().refuse_connect.push_back(kind);
        }

        /// Commands issued to `token`, in order
        pub fn ops(&self, token: Token) -> Vec<Op> {
            self.journal
                .lock()
                .unwrap()
                .ops
                .iter()
                .filter(|(t, _)| *t == token)
                .map(|(_, op)| op.clone())
                .collect()
        }

        /// Number of `Close` commands issued to `token`
        pub fn close_count(&self, token: Token) -> usize {
            self.ops(token).iter().filter(|op| **op == Op::Close).count()
        }

        /// Outbound connects issued so far
        pub fn connects(&self) -> Vec<(Token, SocketAddr)> {
            self.journal.lock().unwrap().connects.clone()
        }

        /// Bytes written to `token`, concatenated
        pub fn written(&self, token: Token) -> Vec<u8> {
            self.ops(token)
                .into_iter()
                .filter_map(|op| match op {
                    Op::Write(data) => Some(data.to_vec()),
                    _ => None,
                })
                .flatten()
                .collect()
        }

        fn transport(&self) -> FakeTransport {
            let mut next = self.next_token.lock().unwrap();
            *next += 1;
            FakeTransport { token: Token(*next), journal: Arc::clone(&self.journal) }
        }
    }

    /// Accepted socket handed to [`FakeReactor::attach`]
    pub struct FakeSocket;

    impl Reactor for FakeReactor {
        type Socket = FakeSocket;

        fn attach(&mut self, _socket: FakeSocket) -> io::Result<Box<dyn Transport>> {
            Ok(Box::new(self.transport()))
        }

        fn connect(&mut self, addr: SocketAddr) -> io::Result<Box<dyn Transport>> {
            if let Some(kind) = self.journal.lock().unwrap().refuse_connect.pop_front() {
                return Err(io::Error::new(kind, "connect refused by fake reactor"));
            }
            let transport = self.transport();
            self.journal.lock().unwrap().connects.push((transport.token, addr));
            Ok(Box::new(transport))
        }
    }

    /// Transport that appends every command to the shared journal
    pub struct FakeTransport {
        token: Token,
        journal: Arc<Mutex<Journal>>,
    }

    impl FakeTransport {
        pub fn detached(token: Token) -> (Self, FakeReactor) {
            let reactor = FakeReactor::new();
            let transport = FakeTransport { token, journal: Arc::clone(&reactor.journal) };
            (transport, reactor)
        }

        fn record(&self, op: Op) {
            self.journal.lock().unwrap().ops.push((self.token, op));
        }
    }

    impl Transport for FakeTransport {
        fn token(&self) -> Token {
            self.token
        }

        fn set_read_interest(&mut self, enabled: bool) {
            self.record(Op::ReadInterest(enabled));
        }

        fn write(&mut self, data: Bytes) {
            self.record(Op::Write(data));
        }

        fn configure(&mut self, options: SocketOptions) {
            self.record(Op::Configure(options));
        }

        fn close(&mut self) {
            self.record(Op::Close);
        }
    }
}
