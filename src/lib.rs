//! TCP Bridge: a transparent TCP relay
//!
//! Accepts client connections on a local address and, for each one, opens
//! a matching connection to a fixed upstream address, then splices bytes
//! both ways until either side closes or fails.
//!
//! # Architecture
//!
//! - [`reactor`]: the I/O seam. One tokio driver task per socket posts
//!   events to a single dispatcher.
//! - [`bridge`]: the connection lifecycle. Sessions, their endpoints, the
//!   pending connect table and the session registry.
//! - [`proxy`]: the acceptor, the dispatcher loop and its control handle.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tcp_bridge::{Proxy, Result};
//! use tcp_bridge::config::ProxyConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Arc::new(ProxyConfig {
//!         listen: "127.0.0.1:9000".to_string(),
//!         upstream: "10.0.0.5:80".to_string(),
//!         ..ProxyConfig::default()
//!     });
//!
//!     let proxy = Proxy::bind(config).await?;
//!     let (handle, task) = proxy.start();
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await?;
//!     let summary = task.await.expect("proxy task panicked")?;
//!     println!("Tore down {} sessions", summary.sessions_torn_down);
//!     Ok(())
//! }
//! ```

// Public modules
pub mod bridge;
pub mod common;
pub mod config;
pub mod proxy;
pub mod reactor;

// Re-export commonly used structures and functions for convenience
pub use bridge::{BridgeContext, ProxyStats};
pub use common::{parse_socket_addr, ProxyError, Result};
pub use proxy::{Proxy, ProxyHandle, ShutdownSummary};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
