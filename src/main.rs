//! obexd - OBEX Object Push daemon
//!
//! Accepts OBEX sessions over TCP and stores pushed objects in an inbox directory.

use obex_server::{Config, Daemon};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if OBEXD_CONFIG is set, then env overrides)
    let config_path = std::env::var("OBEXD_CONFIG").ok();
    let config = match Config::load() {
        Ok(c) => {
            if let Some(path) = &config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if config_path.is_some() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    std::fs::create_dir_all(&config.push.inbox_dir)?;
    let business_card = config.push.load_business_card()?;

    tracing::info!("Starting obexd");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Max connections: {}", config.network.max_connections);
    tracing::info!("  MTU: {}", config.socket.mtu);
    tracing::info!("  Inbox: {}", config.push.inbox_dir.display());
    tracing::info!("  Max object size: {} bytes", config.push.max_object_bytes);
    match &business_card {
        Some(card) => tracing::info!("  Business card: {} bytes", card.len()),
        None => tracing::info!("  Business card: none"),
    }

    let daemon = Arc::new(Daemon::new(config).with_business_card(business_card));

    // Spawn shutdown signal handler
    let shutdown_daemon = daemon.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping daemon...");
        shutdown_daemon.shutdown();
    });

    // Run daemon (blocks until shutdown)
    daemon.run().await?;

    let stats = daemon.stats();
    tracing::info!(
        "Daemon stopped ({} connections, {} objects received)",
        stats.connections_total.load(std::sync::atomic::Ordering::Relaxed),
        stats.objects_received.load(std::sync::atomic::Ordering::Relaxed)
    );
    Ok(())
}
