//! Proxy server module
//!
//! This module runs the dispatcher: one task that accepts clients, receives
//! every reactor event and every control message, and is the only code that
//! touches session state.

use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::acceptor::Acceptor;
use super::message::{create_channel, ProxyHandle, ProxyMessage};
use crate::bridge::{BridgeContext, ProxyStats};
use crate::common::Result;
use crate::config::ProxyConfig;
use crate::reactor::{DriverSettings, TokioReactor};

/// Outcome of an orderly shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Sessions that were still live and got torn down
    pub sessions_torn_down: usize,
    /// Counters at the moment shutdown began
    pub stats: ProxyStats,
}

/// Proxy server structure
///
/// Accepts clients on the local address and relays each one to the
/// upstream address.
pub struct Proxy {
    /// Bound listener
    acceptor: Acceptor,
    /// Upstream every client is relayed to
    upstream: SocketAddr,
    /// Proxy configuration
    config: Arc<ProxyConfig>,
}

impl Proxy {
    /// Resolve the configured addresses and bind the listener
    ///
    /// # Errors
    ///
    /// Returns an error if an address does not resolve or the listener
    /// cannot be bound.
    pub async fn bind(config: Arc<ProxyConfig>) -> Result<Self> {
        let listen = config.listen_addr()?;
        let upstream = config.upstream_addr()?;
        let acceptor = Acceptor::listen(listen).await?;

        Ok(Self { acceptor, upstream, config })
    }

    /// Address clients connect to
    pub fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    /// Address clients are relayed to
    pub fn upstream_addr(&self) -> SocketAddr {
        self.upstream
    }

    /// Spawn the proxy on the current runtime
    ///
    /// # Returns
    ///
    /// Returns the control handle and the task, which resolves when the
    /// proxy stops
    pub fn start(self) -> (ProxyHandle, JoinHandle<Result<ShutdownSummary>>) {
        let (handle, rx) = create_channel();
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    /// Run the dispatcher until a shutdown message or a fatal error
    ///
    /// Dropping every handle does not stop the proxy.
    ///
    /// # Errors
    ///
    /// Returns an error if a connect completion cannot be matched to a
    /// session. All sessions are torn down before returning either way.
    pub async fn run(self, mut control: mpsc::Receiver<ProxyMessage>) -> Result<ShutdownSummary> {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let reactor = TokioReactor::new(events_tx, DriverSettings::from(&*self.config));
        let mut bridge = BridgeContext::new(reactor, self.upstream);
        let mut control_open = true;

        info!("Proxy service started, listening on {}", self.acceptor.local_addr());
        info!("Forwarding to {}", self.upstream);

        let outcome = loop {
            tokio::select! {
                message = control.recv(), if control_open => match message {
                    Some(ProxyMessage::Shutdown) => {
                        info!("Received shutdown message");
                        break Ok(());
                    }
                    Some(ProxyMessage::Stats { response }) => {
                        let _ = response.send(bridge.stats());
                    }
                    None => control_open = false,
                },

                Some(event) = events.recv() => {
                    let token = event.token();
                    match bridge.dispatch(event) {
                        Ok(()) => {}
                        Err(e) if e.is_fatal() => {
                            error!("Stopping proxy after event on {}: {}", token, e);
                            break Err(e);
                        }
                        Err(e) => warn!("Event on {} failed: {}", token, e),
                    }
                }

                accepted = self.acceptor.accept() => match accepted {
                    Ok((socket, client_addr)) => {
                        bridge.on_accept(socket, client_addr);
                    }
                    Err(e) => error!("Error accepting connection: {}", e),
                },
            }
        };

        let stats = bridge.stats();
        let sessions_torn_down = bridge.shutdown();
        info!("Proxy service shutdown complete");

        outcome.map(|()| ShutdownSummary { sessions_torn_down, stats })
    }
}
