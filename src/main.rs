//! JsonDB server
//!
//! Opens the storage engine, starts the TTL reaper and serves clients until
//! Ctrl+C. On shutdown the reaper is stopped before the journals are synced.

use anyhow::Context;
use clap::Parser;
use jsondb::commands::CommandHandler;
use jsondb::config::Config;
use jsondb::connection::{handle_connection, ConnectionStats};
use jsondb::storage::{Reaper, ReaperConfig, StorageEngine};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// JsonDB - a persistent JSON key-value database
#[derive(Parser, Debug)]
#[command(name = "jsondb", version)]
struct Args {
    /// Host to bind to
    #[arg(long, env = "JSONDB_HOST", default_value = jsondb::DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "JSONDB_PORT", default_value_t = jsondb::DEFAULT_PORT)]
    port: u16,

    /// Root directory for AOF journals and snapshots
    #[arg(long, env = "JSONDB_DATA_DIR", default_value = jsondb::config::DEFAULT_DB_PATH)]
    data_dir: PathBuf,

    /// Seconds between TTL reaper sweeps
    #[arg(long, env = "JSONDB_REAP_INTERVAL", default_value_t = 60)]
    reap_interval: u64,

    /// Log filter used when RUST_LOG is not set (e.g. "debug", "jsondb=trace")
    #[arg(long, env = "JSONDB_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn storage_config(&self) -> Config {
        Config::new(&self.data_dir).with_reaper_interval(Duration::from_secs(self.reap_interval.max(1)))
    }
}

fn print_banner(args: &Args) {
    println!(
        r#"
JsonDB v{} - Persistent JSON Key-Value Database
──────────────────────────────────────────────────
Data directory: {}
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        jsondb::VERSION,
        args.data_dir.display(),
        args.bind_address()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // database 0 must open before we accept anyone
    let config = args.storage_config();
    let reaper_config = ReaperConfig {
        interval: config.reaper_interval,
    };
    let storage = Arc::new(
        StorageEngine::open(config)
            .with_context(|| format!("failed to open database 0 in {}", args.data_dir.display()))?,
    );
    info!(path = %args.data_dir.display(), "Storage engine initialized");

    let reaper = Reaper::start(Arc::clone(&storage), reaper_config);
    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(args.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", args.bind_address()))?;
    print_banner(&args);
    info!(address = %args.bind_address(), "Listening");

    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&storage), Arc::clone(&stats)) => {}
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Shutdown signal received, stopping server...");
        }
    }

    reaper.shutdown().await;
    storage.sync_all().context("failed to sync AOF files")?;

    let engine_stats = storage.stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        errors = stats.command_errors.load(Ordering::Relaxed),
        databases = engine_stats.open_databases,
        expired = engine_stats.expired_keys,
        "Server shutdown complete"
    );
    Ok(())
}

/// Accepts connections forever, one task per client.
async fn accept_loop(listener: TcpListener, storage: Arc<StorageEngine>, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = CommandHandler::new(Arc::clone(&storage));
                tokio::spawn(handle_connection(stream, addr, handler, Arc::clone(&stats)));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
