//! Network utility functions
//!
//! This module provides utility functions for network operations.

use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use log::debug;

use super::error::{ProxyError, Result};

/// Parse a socket address
///
/// Literal `ip:port` forms are parsed directly; anything else goes through
/// the system resolver and the first returned address wins.
///
/// # Arguments
///
/// * `addr` - The address string to parse
///
/// # Returns
///
/// The parsed `SocketAddr`
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    // Try direct parsing first
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    debug!("Resolving address {}", addr);

    match addr.to_socket_addrs() {
        Ok(mut addrs) => addrs
            .next()
            .ok_or_else(|| ProxyError::Network(format!("Address resolved to nothing: {}", addr))),
        Err(e) => Err(ProxyError::Network(format!("Failed to resolve address {}: {}", addr, e))),
    }
}

/// Join a host and a port into the `host:port` form, bracketing IPv6 literals
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_socket_addr() {
        // Test valid address
        let addr = parse_socket_addr("127.0.0.1:8080");
        assert!(addr.is_ok(), "Should be able to parse a valid address");
        assert_eq!(addr.unwrap().port(), 8080);

        // Test invalid address
        let addr = parse_socket_addr("invalid-address");
        assert!(addr.is_err(), "Should fail to parse an invalid address");
    }

    #[test]
    fn test_parse_localhost() {
        let addr = parse_socket_addr("localhost:9000").expect("localhost should resolve");
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 9000);
    }

    #[test]
    fn test_join_host_port() {
        assert_eq!(join_host_port("127.0.0.1", 9000), "127.0.0.1:9000");
        assert_eq!(join_host_port("::1", 80), "[::1]:80");
        assert_eq!(join_host_port("[::1]", 80), "[::1]:80");
        assert_eq!(
            parse_socket_addr(&join_host_port("::1", 80)).unwrap(),
            "[::1]:80".parse::<SocketAddr>().unwrap()
        );
    }
}
