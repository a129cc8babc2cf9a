//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

use crate::reactor::Token;

/// TCP bridge error type
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The listener could not be bound; the process cannot provide service
    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        /// Address the bind was attempted on
        addr: SocketAddr,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Address resolution error
    #[error("Network error: {0}")]
    Network(String),

    /// A connect completion arrived for a socket no session is waiting on.
    ///
    /// The pending table is exhaustive for in-flight connects, so this is a
    /// logic error rather than a network condition.
    #[error("No pending connect matches completion from {peer} on {token}")]
    UnmatchedConnect {
        /// Remote address of the completing socket
        peer: SocketAddr,
        /// Identity of the completing socket
        token: Token,
    },

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

impl ProxyError {
    /// Whether this error means the process must stop serving
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Bind { .. } | Self::UnmatchedConnect { .. })
    }
}

impl From<config::ConfigError> for ProxyError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        // Test IO error conversion
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let proxy_err: ProxyError = io_err.into();

        match proxy_err {
            ProxyError::Io(_) => {}
            _ => panic!("Should convert to IO error"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = ProxyError::Config("buffer_size must be greater than 0".to_string());
        assert!(err.to_string().contains("buffer_size"));

        let err = ProxyError::UnmatchedConnect {
            peer: "10.0.0.5:80".parse().unwrap(),
            token: Token(7),
        };
        let err_str = err.to_string();
        assert!(err_str.contains("10.0.0.5:80"));
        assert!(err_str.contains("#7"));
    }

    #[test]
    fn test_fatal_classification() {
        let bind = ProxyError::Bind {
            addr: "127.0.0.1:9000".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(bind.is_fatal());
        assert!(!ProxyError::Network("unresolvable".to_string()).is_fatal());
    }
}
