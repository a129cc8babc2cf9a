//! Configuration module
//!
//! This module handles application configuration: defaults, an optional
//! JSON file, `TCP_BRIDGE_*` environment variables and the positional
//! command line, in increasing order of precedence.

mod defaults;
mod loader;
mod validator;

pub use self::defaults::ENV_PREFIX;
pub use self::loader::ConfigLoader;
pub use self::validator::ConfigValidator;

use log::info;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::common::{parse_socket_addr, Result};

/// Proxy configuration
///
/// Contains all configuration options needed for the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyConfig {
    // --- Network settings ---

    /// Local address to accept clients on (host:port)
    pub listen: String,

    /// Upstream address every client is relayed to (host:port)
    pub upstream: String,

    // --- General settings ---

    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,

    /// Size of one read in bytes
    ///
    /// This is also the most a session buffers per direction.
    pub buffer_size: usize,

    /// Outbound connect timeout in seconds
    pub connect_timeout: u64,

    /// Idle timeout in seconds; 0 disables it
    pub idle_timeout: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            upstream: defaults::upstream(),
            log_level: defaults::log_level(),
            buffer_size: defaults::buffer_size(),
            connect_timeout: defaults::connect_timeout(),
            idle_timeout: defaults::idle_timeout(),
        }
    }
}

impl ProxyConfig {
    /// Resolve the listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_socket_addr(&self.listen)
    }

    /// Resolve the upstream address
    pub fn upstream_addr(&self) -> Result<SocketAddr> {
        parse_socket_addr(&self.upstream)
    }
}

/// Log the effective configuration
pub fn log_config(config: &ProxyConfig) {
    if !log::log_enabled!(log::Level::Info) {
        return;
    }

    info!("=== Configuration ===");
    info!("  Listen address: {}", config.listen);
    info!("  Upstream address: {}", config.upstream);
    info!("  Log level: {}", config.log_level);
    info!("  Buffer size: {} bytes", config.buffer_size);
    info!("  Connect timeout: {} seconds", config.connect_timeout);
    match config.idle_timeout {
        0 => info!("  Idle timeout: disabled"),
        secs => info!("  Idle timeout: {} seconds", secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();

        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.upstream, "127.0.0.1:8000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.buffer_size, 8192);
        assert_eq!(config.connect_timeout, 30);
        assert_eq!(config.idle_timeout, 0);
    }

    #[test]
    fn test_resolve_addresses() {
        let config = ProxyConfig {
            listen: "127.0.0.1:9000".to_string(),
            upstream: "localhost:80".to_string(),
            ..ProxyConfig::default()
        };

        assert_eq!(config.listen_addr().unwrap().port(), 9000);
        assert!(config.upstream_addr().unwrap().ip().is_loopback());

        let broken = ProxyConfig { upstream: "nowhere".to_string(), ..ProxyConfig::default() };
        assert!(broken.upstream_addr().is_err());
    }

    #[test]
    fn test_log_config_does_not_panic() {
        log_config(&ProxyConfig::default());
    }
}
