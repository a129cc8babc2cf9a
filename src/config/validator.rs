//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use log::warn;

use crate::common::{ProxyError, Result};
use crate::config::ProxyConfig;

/// Reads larger than this only waste memory per session
const LARGE_BUFFER: usize = 16 * 1024 * 1024;

/// Configuration validator trait
pub trait ConfigValidator {
    /// Reject configurations the proxy cannot run with
    fn validate(&self) -> Result<()>;

    /// Collect non-fatal problems
    fn check_warnings(&self) -> Vec<String>;
}

impl ConfigValidator for ProxyConfig {
    fn validate(&self) -> Result<()> {
        if self.listen.trim().is_empty() {
            return Err(ProxyError::Config("Listen address must not be empty".to_string()));
        }
        if self.upstream.trim().is_empty() {
            return Err(ProxyError::Config("Upstream address must not be empty".to_string()));
        }
        if self.listen == self.upstream {
            return Err(ProxyError::Config(
                "Listen and upstream addresses must be different".to_string(),
            ));
        }

        if self.buffer_size == 0 {
            return Err(ProxyError::Config("Buffer size must be greater than 0".to_string()));
        }
        if self.connect_timeout == 0 {
            return Err(ProxyError::Config("Connect timeout must be greater than 0".to_string()));
        }

        for warning in self.check_warnings() {
            warn!("{}", warning);
        }
        Ok(())
    }

    fn check_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        match self.log_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => warnings.push(format!("Invalid log level '{}', using default 'info'", level)),
        }

        if self.buffer_size > LARGE_BUFFER {
            warnings.push(format!(
                "Buffer size of {} bytes is buffered per direction of every session",
                self.buffer_size
            ));
        }

        warnings
    }
}
