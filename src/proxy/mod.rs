//! Proxy service module
//!
//! This module wires the bridge core to real sockets: the acceptor, the
//! dispatcher loop, and the message-driven control handle.

mod acceptor;
mod message;
mod server;

pub use acceptor::Acceptor;
pub use message::{create_channel, ProxyHandle, ProxyMessage};
pub use server::{Proxy, ShutdownSummary};
