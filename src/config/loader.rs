//! Configuration loading functionality
//!
//! This module loads configuration from a JSON file and the environment
//! using the `config` crate, then lets the command line override it.

use config::{Config, Environment, File, FileFormat};
use log::debug;
use std::path::Path;

use crate::common::{join_host_port, level_for_debug, ProxyError, Result};
use crate::config::defaults::ENV_PREFIX;
use crate::config::ProxyConfig;

/// Trait for loading configuration from different sources
pub trait ConfigLoader: Sized {
    /// Load configuration from a JSON file, over the defaults
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self>;

    /// Load configuration from `TCP_BRIDGE_*` environment variables, over the defaults
    fn from_env() -> Result<Self>;

    /// Load defaults, then the file if given, then the environment
    fn load(config_file: Option<&Path>) -> Result<Self>;

    /// Override the addresses with the positional command line
    fn with_endpoints(self, local_host: &str, local_port: u16, upstream_host: &str, upstream_port: u16) -> Self;

    /// Override the log level with the optional debug flag
    fn with_debug(self, debug: Option<bool>) -> Self;
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX).try_parsing(true)
}

fn deserialize(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<ProxyConfig> {
    builder
        .build()
        .and_then(|config| config.try_deserialize())
        .map_err(ProxyError::from)
}

impl ConfigLoader for ProxyConfig {
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ProxyError::Config(format!("Configuration file not found: {}", path.display())));
        }

        debug!("Loading configuration from {}", path.display());
        deserialize(Config::builder().add_source(File::from(path).format(FileFormat::Json)))
    }

    fn from_env() -> Result<Self> {
        deserialize(Config::builder().add_source(environment()))
    }

    fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_file {
            if !path.is_file() {
                return Err(ProxyError::Config(format!("Configuration file not found: {}", path.display())));
            }
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).format(FileFormat::Json));
        }

        deserialize(builder.add_source(environment()))
    }

    fn with_endpoints(mut self, local_host: &str, local_port: u16, upstream_host: &str, upstream_port: u16) -> Self {
        self.listen = join_host_port(local_host, local_port);
        self.upstream = join_host_port(upstream_host, upstream_port);
        self
    }

    fn with_debug(mut self, debug: Option<bool>) -> Self {
        if let Some(debug) = debug {
            self.log_level = level_for_debug(debug).to_string();
        }
        self
    }
}
