//! Site proxy binary.
//!
//! ```text
//!     Client ──▶ listener ──▶ router (site by prefix) ──▶ admission (W + Q)
//!                                                              │
//!                                                              ▼
//!     Client ◀── relay (headers, cookies, Location, body) ◀── upstream fetch ◀── Origin
//! ```
//!
//! Startup order: config → logging → metrics → server (pool, upstream
//! client) → config watcher → signal handler → listener.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use site_proxy::config::loader::load_config;
use site_proxy::config::watcher::ConfigWatcher;
use site_proxy::lifecycle::signals::wait_for_shutdown_signal;
use site_proxy::net::load_tls_config;
use site_proxy::observability::{logging, metrics};
use site_proxy::{HttpServer, ProxyConfig, Shutdown};

#[derive(Parser)]
#[command(name = "site-proxy")]
#[command(about = "Reverse proxy publishing remote sites under local path prefixes", long_about = None)]
struct Cli {
    /// TOML configuration file. Watched for site changes while running.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set. Overrides the config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if cli.check {
        println!("configuration ok: {} site(s)", config.sites.len());
        return Ok(());
    }

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.observability.log_level);
    logging::init_logging(level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "site-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        workers = config.pool.workers,
        backlog = config.pool.backlog,
        suspend_secs = config.timeouts.suspend_secs,
        sites = config.sites.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(config.clone())?;

    // The watcher handle must outlive the server.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            shutdown.trigger();
        });
    }

    match &config.listener.tls {
        Some(tls) => {
            let addr: SocketAddr = config.listener.bind_address.parse()?;
            let tls = load_tls_config(tls).await?;
            server
                .run_tls(addr, tls, config_updates, shutdown.subscribe())
                .await?;
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            server
                .run(listener, config_updates, shutdown.subscribe())
                .await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
