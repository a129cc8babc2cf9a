//! Proxy message types
//!
//! This module defines the messages that can be sent to a running proxy.
//! The dispatcher owns all session state, so the outside world talks to it
//! through a channel instead of sharing that state.

use tokio::sync::{mpsc, oneshot};

use crate::bridge::ProxyStats;
use crate::common::{ProxyError, Result};

/// Messages that can be sent to the proxy service
#[derive(Debug)]
pub enum ProxyMessage {
    /// Report the current counters
    Stats {
        /// Response channel
        response: oneshot::Sender<ProxyStats>,
    },
    /// Tear down every session and stop
    Shutdown,
}

/// Proxy control handle
///
/// Cheap to clone; every clone talks to the same proxy.
#[derive(Debug, Clone)]
pub struct ProxyHandle {
    /// Message sender
    sender: mpsc::Sender<ProxyMessage>,
}

impl ProxyHandle {
    /// Create a new proxy handle
    pub fn new(sender: mpsc::Sender<ProxyMessage>) -> Self {
        Self { sender }
    }

    /// Send a message to the proxy service
    ///
    /// # Parameters
    ///
    /// * `message` - Message to send
    ///
    /// # Returns
    ///
    /// Returns an error if the proxy is no longer running
    pub async fn send(&self, message: ProxyMessage) -> Result<()> {
        self.sender.send(message).await
            .map_err(|_| ProxyError::Other("Failed to send message to proxy service".to_string()))
    }

    /// Query the current counters
    pub async fn stats(&self) -> Result<ProxyStats> {
        let (response, receiver) = oneshot::channel();
        self.send(ProxyMessage::Stats { response }).await?;
        receiver.await
            .map_err(|_| ProxyError::Other("Proxy service stopped before answering".to_string()))
    }

    /// Shutdown the proxy service
    ///
    /// Every session is torn down without draining buffered bytes.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(ProxyMessage::Shutdown).await
    }
}

/// Create a new proxy message channel
///
/// # Returns
///
/// Returns the handle and the receiver the proxy service reads from
pub fn create_channel() -> (ProxyHandle, mpsc::Receiver<ProxyMessage>) {
    let (tx, rx) = mpsc::channel(16);
    (ProxyHandle::new(tx), rx)
}
