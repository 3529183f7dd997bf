//! # hubd
//!
//! HomeHub daemon. Loads the hub configuration, starts the relay agent and
//! runs until SIGINT or SIGTERM.
//!
//! ## Usage
//! ```text
//! hubd                  # platform config dir, then environment
//! hubd /etc/hub.toml    # explicit config file
//! hubd --init [PATH]    # write a default config and exit
//! ```

use std::path::PathBuf;

use anyhow::Context;
use homehub_relay::{HubAgent, HubAgentHandle, HubConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let mut args = std::env::args().skip(1);
    let first = args.next();

    if first.as_deref() == Some("--init") {
        let path = args.next().map(PathBuf::from);
        HubConfig::default()
            .save(path)
            .context("failed to write default config")?;
        return Ok(());
    }

    let config = HubConfig::load(first.map(PathBuf::from)).context("failed to load config")?;
    let connect_delay = config.connect_delay();

    info!(
        hub_id = %config.hub_id(),
        name = %config.hub.name,
        port = config.local.port,
        capacity = config.registry.capacity,
        "Configuration loaded"
    );

    let hub = HubAgent::new(config)
        .start()
        .await
        .context("failed to start hub agent")?;
    info!(addr = %hub.local_addr(), "Hub running");

    tokio::spawn(connect_after(hub.clone(), connect_delay));

    shutdown_signal().await;

    if let Err(e) = hub.shutdown().await {
        warn!(error = %e, "Hub agent already stopped");
    }
    // Let the loop close the listener and the upstream link.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    info!("Hub shutdown complete");
    Ok(())
}

/// Starts the upstream link once the post-boot delay has passed.
async fn connect_after(hub: HubAgentHandle, delay: std::time::Duration) {
    if !delay.is_zero() {
        info!(?delay, "Delaying upstream connect");
        tokio::time::sleep(delay).await;
    }
    if let Err(e) = hub.connect_upstream().await {
        warn!(error = %e, "Could not start upstream link");
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping hub");
}
