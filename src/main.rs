//! TCP Bridge command line tool
//!
//! `proxy <local-host> <local-port> <upstream-host> <upstream-port> [<debug:true|false>]`

use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use tcp_bridge::common::{init_logger, ProxyError, Result};
use tcp_bridge::config::{log_config, ConfigLoader, ConfigValidator, ProxyConfig};
use tcp_bridge::{Proxy, APP_NAME, VERSION};

/// Transparent TCP relay from a local address to a fixed upstream
#[derive(Parser, Debug)]
#[clap(name = "proxy", author, version = VERSION, about, long_about = None)]
struct Args {
    /// Local host to accept clients on
    local_host: String,

    /// Local port to accept clients on
    local_port: u16,

    /// Upstream host to relay to
    upstream_host: String,

    /// Upstream port to relay to
    upstream_port: u16,

    /// Enable debug logging (true or false)
    debug: Option<bool>,

    /// JSON file with tuning options (buffer_size, connect_timeout, idle_timeout)
    #[clap(long, env = "TCP_BRIDGE_CONFIG_FILE")]
    config_file: Option<PathBuf>,
}

/// Wait for an interrupt or hangup
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = signal(SignalKind::hangup())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "interrupt").map_err(ProxyError::Io),
            _ = hangup.recv() => Ok("hangup"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("interrupt")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Usage errors exit with status 1 before anything is bound
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => {
            let _ = e.print();
            return Ok(());
        }
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    let config = ProxyConfig::load(args.config_file.as_deref())?
        .with_endpoints(&args.local_host, args.local_port, &args.upstream_host, args.upstream_port)
        .with_debug(args.debug);

    init_logger(&config.log_level);
    info!("Starting {} v{}", APP_NAME, VERSION);

    config.validate()?;
    log_config(&config);

    let proxy = Proxy::bind(Arc::new(config)).await?;
    let (handle, mut service) = proxy.start();
    info!("Proxy service ready, press Ctrl+C to stop");

    let finished = tokio::select! {
        signal = shutdown_signal() => {
            info!("Received {} signal, shutting down", signal?);
            if let Err(e) = handle.shutdown().await {
                warn!("Proxy service already stopped: {}", e);
            }
            (&mut service).await
        }
        finished = &mut service => finished,
    };

    let summary = finished
        .map_err(|e| ProxyError::Other(format!("Proxy task failed: {}", e)))??;
    info!(
        "Shutdown complete: {} sessions torn down, {} bytes to upstream, {} bytes to clients",
        summary.sessions_torn_down,
        summary.stats.bytes_to_upstream,
        summary.stats.bytes_to_client
    );

    Ok(())
}
