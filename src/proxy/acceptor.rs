//! Acceptor
//!
//! Listens on the local address and yields accepted client sockets. The
//! accept itself never blocks the dispatcher: it is one branch of the
//! dispatcher's select loop.

use log::debug;
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

use crate::common::{ProxyError, Result};

/// Listening socket of the proxy
#[derive(Debug)]
pub struct Acceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Acceptor {
    /// Bind and start listening on `addr`
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Bind`] if the address cannot be bound; the
    /// process cannot provide service without it.
    pub async fn listen(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ProxyError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        debug!("Waiting to accept connections on {}", local_addr);
        Ok(Self { listener, local_addr })
    }

    /// Address actually bound, with the real port when 0 was requested
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the next client
    pub async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, client_addr) = self.listener.accept().await?;
        debug!("Accepted connection from {}", client_addr);
        Ok((stream, client_addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listen_on_ephemeral_port() {
        let acceptor = Acceptor::listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
        assert_ne!(acceptor.local_addr().port(), 0);

        let addr = acceptor.local_addr();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), acceptor.accept());
        let client = client.unwrap();
        let (_stream, client_addr) = accepted.unwrap();
        assert_eq!(client_addr, client.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let first = Acceptor::listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let taken = first.local_addr();

        let err = Acceptor::listen(taken).await.unwrap_err();
        assert!(matches!(err, ProxyError::Bind { addr, .. } if addr == taken));
        assert!(err.is_fatal());
    }
}
