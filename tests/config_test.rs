//! Configuration tests
//!
//! This module contains tests for the configuration system.

use serial_test::serial;
use std::io::Write;

use tcp_bridge::config::{ConfigLoader, ConfigValidator, ProxyConfig};

/// Test default configuration
#[test]
fn test_default_config() {
    let config = ProxyConfig::default();

    assert_eq!(config.listen, "127.0.0.1:9000");
    assert_eq!(config.upstream, "127.0.0.1:8000");
    assert_eq!(config.log_level, "info");
    assert_eq!(config.buffer_size, 8192);
    assert_eq!(config.connect_timeout, 30);
    assert_eq!(config.idle_timeout, 0);
    assert!(config.validate().is_ok());
}

/// Test the full precedence chain: defaults < file < env < command line
#[test]
#[serial]
fn test_configuration_priority() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        r#"{{
            "listen": "0.0.0.0:7000",
            "upstream": "10.0.0.5:80",
            "log_level": "warn",
            "buffer_size": 16384,
            "connect_timeout": 10
        }}"#
    )
    .unwrap();

    std::env::set_var("TCP_BRIDGE_CONNECT_TIMEOUT", "5");
    std::env::set_var("TCP_BRIDGE_IDLE_TIMEOUT", "60");
    let loaded = ProxyConfig::load(Some(file.path()));
    std::env::remove_var("TCP_BRIDGE_CONNECT_TIMEOUT");
    std::env::remove_var("TCP_BRIDGE_IDLE_TIMEOUT");

    let config = loaded
        .expect("Configuration should load")
        .with_endpoints("127.0.0.1", 9100, "::1", 8080)
        .with_debug(Some(true));

    // File beats defaults
    assert_eq!(config.buffer_size, 16384);
    // Environment beats file
    assert_eq!(config.connect_timeout, 5);
    assert_eq!(config.idle_timeout, 60);
    // Command line beats everything
    assert_eq!(config.listen, "127.0.0.1:9100");
    assert_eq!(config.upstream, "[::1]:8080");
    assert_eq!(config.log_level, "debug");

    assert!(config.validate().is_ok());
    assert_eq!(config.listen_addr().unwrap().port(), 9100);
    assert!(config.upstream_addr().unwrap().is_ipv6());
}

/// Test that the debug flag is optional
#[test]
fn test_debug_flag_absent() {
    let config = ProxyConfig::default().with_debug(None);
    assert_eq!(config.log_level, "info");

    let config = ProxyConfig::default().with_debug(Some(false));
    assert_eq!(config.log_level, "info");
}

/// Test rejected configurations
#[test]
fn test_invalid_config() {
    let same = ProxyConfig::default().with_endpoints("127.0.0.1", 9000, "127.0.0.1", 9000);
    assert!(same.validate().is_err(), "Relaying to the listen address must be rejected");

    let config = ProxyConfig { buffer_size: 0, ..ProxyConfig::default() };
    assert!(config.validate().is_err());

    let config = ProxyConfig { log_level: "loud".to_string(), ..ProxyConfig::default() };
    assert!(config.validate().is_ok());
    assert_eq!(config.check_warnings().len(), 1);
}
