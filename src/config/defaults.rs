//! Default configuration values
//!
//! This module provides default values for configuration options.
//! It is the single source of truth for defaults.

/// Environment variable prefix for all configuration options
///
/// `TCP_BRIDGE_BUFFER_SIZE=16384` sets `buffer_size`, and so on.
pub const ENV_PREFIX: &str = "TCP_BRIDGE";

/// Default listen address
pub const LISTEN_STR: &str = "127.0.0.1:9000";

/// Default upstream address
pub const UPSTREAM_STR: &str = "127.0.0.1:8000";

/// Default log level
pub const LOG_LEVEL_STR: &str = "info";

/// Default listen address
pub fn listen() -> String {
    LISTEN_STR.to_string()
}

/// Default upstream address
pub fn upstream() -> String {
    UPSTREAM_STR.to_string()
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default read chunk size (8KB)
pub fn buffer_size() -> usize {
    8192
}

/// Default outbound connect timeout in seconds
pub fn connect_timeout() -> u64 {
    30
}

/// Default idle timeout in seconds; 0 disables it
pub fn idle_timeout() -> u64 {
    0
}
