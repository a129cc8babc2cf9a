//! Endpoint: one half-duplex side of a session
//!
//! An endpoint wraps a transport with an input buffer (bytes read from its
//! socket, waiting to be relayed) and an output buffer (bytes waiting to be
//! written to its socket). It is closed exactly once, either explicitly or
//! when dropped.

use bytes::{Bytes, BytesMut};
use log::trace;

use crate::reactor::{SocketOptions, Token, Transport};

/// One socket side of a session
pub struct Endpoint {
    token: Token,
    transport: Option<Box<dyn Transport>>,
    input: BytesMut,
    output: BytesMut,
    /// Bytes handed to the transport and not yet confirmed flushed
    in_flight: usize,
    read_enabled: bool,
    write_enabled: bool,
}

impl Endpoint {
    /// Wrap a transport; reading and writing start disabled
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            token: transport.token(),
            transport: Some(transport),
            input: BytesMut::new(),
            output: BytesMut::new(),
            in_flight: 0,
            read_enabled: false,
            write_enabled: false,
        }
    }

    /// Identity of the underlying transport
    pub fn token(&self) -> Token {
        self.token
    }

    /// Whether the endpoint has been closed
    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    /// Whether read interest is currently enabled
    pub fn read_enabled(&self) -> bool {
        self.read_enabled
    }

    /// Bytes queued or written but not yet confirmed flushed
    pub fn unflushed(&self) -> usize {
        self.in_flight + self.output.len()
    }

    /// Bytes received and not yet relayed
    pub fn buffered_input(&self) -> usize {
        self.input.len()
    }

    /// Enable reading; no-op once closed
    pub fn enable_read(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            self.read_enabled = true;
            transport.set_read_interest(true);
        }
    }

    /// Disable reading; no-op once closed
    pub fn disable_read(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            self.read_enabled = false;
            transport.set_read_interest(false);
        }
    }

    /// Allow queued output to reach the socket
    pub fn enable_write(&mut self) {
        self.write_enabled = true;
        self.flush();
    }

    /// Apply socket options; no-op once closed
    pub fn configure(&mut self, options: SocketOptions) {
        if let Some(transport) = self.transport.as_mut() {
            transport.configure(options);
        }
    }

    /// Append a chunk read from the socket to the input buffer
    ///
    /// Chunks arriving after close are discarded.
    pub fn receive(&mut self, data: &[u8]) {
        if self.is_closed() {
            trace!("Discarding {} bytes received on closed endpoint {}", data.len(), self.token);
            return;
        }
        self.input.extend_from_slice(data);
    }

    /// Take everything in the input buffer
    pub fn take_input(&mut self) -> Bytes {
        self.input.split().freeze()
    }

    /// Queue bytes for writing to the socket
    pub fn queue_output(&mut self, data: &[u8]) {
        if self.is_closed() {
            return;
        }
        self.output.extend_from_slice(data);
        self.flush();
    }

    /// The socket confirmed everything written so far
    pub fn on_flushed(&mut self) {
        self.in_flight = 0;
        self.flush();
    }

    fn flush(&mut self) {
        if !self.write_enabled || self.in_flight > 0 || self.output.is_empty() {
            return;
        }
        if let Some(transport) = self.transport.as_mut() {
            let chunk = self.output.split().freeze();
            self.in_flight = chunk.len();
            transport.write(chunk);
        }
    }

    /// Close the socket; later calls do nothing
    ///
    /// Returns whether this call performed the close.
    pub fn close(&mut self) -> bool {
        match self.transport.take() {
            Some(mut transport) => {
                self.read_enabled = false;
                self.write_enabled = false;
                transport.close();
                true
            }
            None => false,
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("token", &self.token)
            .field("closed", &self.is_closed())
            .field("read_enabled", &self.read_enabled)
            .field("input", &self.buffered_input())
            .field("unflushed", &self.unflushed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::testing::{FakeTransport, Op};
    use crate::reactor::MockTransport;

    #[test]
    fn test_starts_disabled() {
        let (transport, reactor) = FakeTransport::detached(Token(1));
        let endpoint = Endpoint::new(Box::new(transport));

        assert_eq!(endpoint.token(), Token(1));
        assert!(!endpoint.read_enabled());
        assert!(!endpoint.is_closed());
        assert!(reactor.ops(Token(1)).is_empty(), "Creating an endpoint must not touch the socket");
    }

    #[test]
    fn test_output_held_until_write_enabled() {
        let (transport, reactor) = FakeTransport::detached(Token(1));
        let mut endpoint = Endpoint::new(Box::new(transport));

        endpoint.queue_output(b"early");
        assert!(reactor.written(Token(1)).is_empty());
        assert_eq!(endpoint.unflushed(), 5);

        endpoint.enable_write();
        assert_eq!(reactor.written(Token(1)), b"early");
    }

    #[test]
    fn test_one_write_in_flight() {
        let (transport, reactor) = FakeTransport::detached(Token(1));
        let mut endpoint = Endpoint::new(Box::new(transport));
        endpoint.enable_write();

        endpoint.queue_output(b"abc");
        endpoint.queue_output(b"def");
        assert_eq!(reactor.ops(Token(1)), vec![Op::Write(Bytes::from_static(b"abc"))]);
        assert_eq!(endpoint.unflushed(), 6);

        endpoint.on_flushed();
        assert_eq!(reactor.written(Token(1)), b"abcdef");
        endpoint.on_flushed();
        assert_eq!(endpoint.unflushed(), 0);
    }

    #[test]
    fn test_receive_and_take_input() {
        let (transport, _reactor) = FakeTransport::detached(Token(1));
        let mut endpoint = Endpoint::new(Box::new(transport));

        endpoint.receive(b"GET / ");
        endpoint.receive(b"HTTP/1.0\r\n\r\n");
        assert_eq!(endpoint.buffered_input(), 18);
        assert_eq!(&endpoint.take_input()[..], b"GET / HTTP/1.0\r\n\r\n");
        assert_eq!(endpoint.buffered_input(), 0);
    }

    #[test]
    fn test_debug_reports_buffers() {
        let (transport, _reactor) = FakeTransport::detached(Token(4));
        let mut endpoint = Endpoint::new(Box::new(transport));
        endpoint.receive(b"ping");

        let debug = format!("{:?}", endpoint);
        assert!(debug.contains("input: 4"), "{}", debug);
        assert!(debug.contains("closed: false"), "{}", debug);
    }

    #[test]
    fn test_closed_endpoint_is_inert() {
        let (transport, reactor) = FakeTransport::detached(Token(1));
        let mut endpoint = Endpoint::new(Box::new(transport));

        assert!(endpoint.close());
        endpoint.enable_read();
        endpoint.enable_write();
        endpoint.receive(b"late");
        endpoint.queue_output(b"late");

        assert_eq!(reactor.ops(Token(1)), vec![Op::Close]);
        assert_eq!(endpoint.buffered_input(), 0);
        assert!(!endpoint.read_enabled());
    }

    #[test]
    fn test_close_at_most_once() {
        let mut transport = MockTransport::new();
        transport.expect_token().return_const(Token(9));
        transport.expect_close().times(1).return_const(());

        let mut endpoint = Endpoint::new(Box::new(transport));
        assert!(endpoint.close());
        assert!(!endpoint.close());
        // Dropping a closed endpoint must not close again
        drop(endpoint);
    }

    #[test]
    fn test_drop_closes() {
        let (transport, reactor) = FakeTransport::detached(Token(3));
        let endpoint = Endpoint::new(Box::new(transport));
        drop(endpoint);
        assert_eq!(reactor.close_count(Token(3)), 1);
    }
}
