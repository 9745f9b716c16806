//! FlashGate - An HTTP Gateway for Redis-Compatible Stores
//!
//! Main entry point: loads configuration, connects to the store, optionally
//! starts topology discovery, and serves HTTP until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use flashgate::commands::CommandDispatcher;
use flashgate::config::{Config, DEFAULT_CONFIG_PATH};
use flashgate::http::{self, AppState};
use flashgate::store::ConnectionRouter;
use flashgate::topology::{self, Host};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// HTTP gateway for a Redis-compatible store
#[derive(Parser, Debug)]
#[command(name = "flashgate")]
#[command(version)]
struct Args {
    /// Address the HTTP server listens on (overrides the config file)
    #[arg(short = 'a', long = "listen")]
    listen: Option<String>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Upstream store address, host:port (overrides the config file)
    #[arg(short, long = "redis")]
    redis: Option<String>,

    /// Password for the upstream store (overrides the config file)
    #[arg(long = "redis-password")]
    redis_password: Option<String>,

    /// Discover the store's replication topology in the background
    #[arg(long)]
    discover: bool,
}

fn print_banner(listen: &str, store: &str) {
    println!(
        r#"
FlashGate v{} - HTTP Gateway for Redis-Compatible Stores
──────────────────────────────────────────────────────────────
HTTP listening on {}
Upstream store   {}

Use Ctrl+C to shutdown gracefully.
"#,
        flashgate::VERSION,
        listen,
        store
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{0},flashgate={0}", default_level)));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(DEFAULT_CONFIG_PATH)?,
    };
    config.validate()?;
    debug!(?config, "Configuration loaded");
    if config.store.disable_info {
        info!("Retrieving node information is disabled");
    }

    let store_addr = args
        .redis
        .clone()
        .unwrap_or_else(|| config.store.connect_addr());
    let password = args
        .redis_password
        .clone()
        .or_else(|| config.store.password());
    let listen = args.listen.clone().unwrap_or_else(|| config.http_addr());

    // Connect and open a connection for every database that holds keys
    let connections = Arc::new(ConnectionRouter::new(store_addr.clone(), password.clone()));
    let found = connections
        .populate()
        .await
        .with_context(|| format!("Could not populate connections to {}", store_addr))?;
    info!(databases = found, addr = %store_addr, "Connected to store");

    let topology = if args.discover {
        let host = Arc::new(Host::new(store_addr.clone(), password));
        let root = Arc::clone(&host);
        tokio::spawn(async move {
            if let Err(e) = topology::discover(root).await {
                warn!(error = %e, "Topology discovery failed");
            }
        });
        Some(host)
    } else {
        None
    };

    if !config.http.enabled {
        warn!("HTTP server disabled in configuration; nothing to serve");
        return Ok(());
    }

    let app = http::router(AppState {
        dispatcher: CommandDispatcher::new(connections),
        topology,
        info_disabled: config.store.disable_info,
    });

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Could not bind {}", listen))?;
    print_banner(&listen, &store_addr);
    info!("Listening on {}", listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server...");
}
