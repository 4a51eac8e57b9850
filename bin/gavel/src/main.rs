//! Gavel - NFT-auction pallet mirror.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults
//! gavel
//!
//! # Start with environment overrides
//! DATABASE_URL=postgres://localhost/gavel WS_URL=ws://localhost:9944 gavel
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};
use tracing_subscriber::{fmt, EnvFilter};

use gavel_core::metrics::init_metrics;
use gavel_core::ports::{BestEffort, BoundedRetry, ChainConnector, FailurePolicy, HeadMode, Stores};
use gavel_core::services::{BlockIndexer, ConnectionSupervisor, SupervisorConfig};
use gavel_storage::{Database, DatabaseConfig, PgStores};
use gavel_substrate::{SubstrateConfig, SubstrateConnector};

/// Gavel CLI - auction pallet mirror.
#[derive(Parser, Debug)]
#[command(name = "gavel")]
#[command(about = "Mirrors an NFT-auction pallet's storage into PostgreSQL")]
#[command(version)]
struct Cli {
    /// Substrate node WebSocket URL.
    #[arg(long, env = "WS_URL", default_value = "ws://127.0.0.1:9944")]
    ws_url: String,

    /// PostgreSQL database URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost/gavel"
    )]
    database_url: String,

    /// Base reconnect delay in seconds.
    #[arg(long, env = "RECONNECT_BASE_DELAY", default_value = "1")]
    reconnect_base_delay: u64,

    /// Reconnect delay ceiling in seconds.
    #[arg(long, env = "RECONNECT_MAX_DELAY", default_value = "30")]
    reconnect_max_delay: u64,

    /// Reconnect attempts before the process gives up.
    #[arg(long, env = "MAX_RECONNECT_ATTEMPTS", default_value = "5")]
    max_reconnect_attempts: u32,

    /// Header work queue capacity.
    #[arg(long, env = "QUEUE_CAPACITY", default_value = "64")]
    queue_capacity: usize,

    /// Head subscription mode: best (fast, may revert) or finalized.
    #[arg(long, env = "HEAD_MODE", default_value = "best", value_parser = parse_head_mode)]
    head_mode: HeadMode,

    /// In-place retries for a failed block before it is abandoned.
    /// 0 keeps the default best-effort policy (skip immediately).
    #[arg(long, env = "BLOCK_RETRY_ATTEMPTS", default_value = "0")]
    block_retry_attempts: u32,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Apply the database schema and exit.
    #[arg(long)]
    migrate_only: bool,

    /// Print active auctions as JSON and exit.
    #[arg(long)]
    dump_active: bool,
}

/// Parse head mode from string.
fn parse_head_mode(s: &str) -> Result<HeadMode, String> {
    match s.to_lowercase().as_str() {
        "best" => Ok(HeadMode::Best),
        "finalized" => Ok(HeadMode::Finalized),
        _ => Err(format!("Invalid head mode '{}'. Use 'best' or 'finalized'.", s)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    // Prometheus metrics exporter (optional - failures don't crash the app)
    match format!("0.0.0.0:{}", cli.metrics_port).parse::<std::net::SocketAddr>() {
        Ok(metrics_addr) => {
            match PrometheusBuilder::new()
                .with_http_listener(metrics_addr)
                .install()
            {
                Ok(()) => init_metrics(),
                Err(e) => {
                    warn!("failed to start metrics exporter: {}. Continuing without metrics.", e);
                }
            }
        }
        Err(e) => warn!("invalid metrics address: {}. Continuing without metrics.", e),
    }

    info!("starting gavel mirror");
    debug!(ws_url = %cli.ws_url, "chain endpoint");
    debug!(database_url = %mask_password(&cli.database_url), "database endpoint");

    let db_config = DatabaseConfig::for_mirror(&cli.database_url);
    let db = Database::connect(&db_config)
        .await
        .context("Failed to connect to database")?;
    db.init_schema().await.context("Failed to apply schema")?;
    info!("database ready");

    if cli.migrate_only {
        info!("--migrate-only flag set, exiting");
        return Ok(());
    }

    let db = Arc::new(db);
    let stores: Arc<dyn Stores> = Arc::new(PgStores::new(db.clone()));

    if cli.dump_active {
        let active = stores
            .auctions()
            .active_auctions()
            .await
            .context("Failed to query active auctions")?;
        println!("{}", serde_json::to_string_pretty(&active)?);
        db.close().await;
        return Ok(());
    }

    let connector: Arc<dyn ChainConnector> = Arc::new(SubstrateConnector::new(SubstrateConfig {
        ws_url: cli.ws_url.clone(),
        head_mode: cli.head_mode,
    }));

    let policy: Arc<dyn FailurePolicy> = if cli.block_retry_attempts > 0 {
        Arc::new(BoundedRetry::new(cli.block_retry_attempts))
    } else {
        Arc::new(BestEffort)
    };

    let indexer = Arc::new(BlockIndexer::new(stores.clone(), policy));

    let supervisor_config = SupervisorConfig {
        base_delay: Duration::from_secs(cli.reconnect_base_delay),
        max_delay: Duration::from_secs(cli.reconnect_max_delay),
        max_reconnect_attempts: cli.max_reconnect_attempts,
        queue_capacity: cli.queue_capacity,
    };
    let supervisor = ConnectionSupervisor::new(connector, indexer, supervisor_config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut supervisor_handle = tokio::spawn(
        async move { supervisor.run(shutdown_rx).await }.instrument(info_span!("supervisor")),
    );

    info!("gavel ready, press Ctrl+C to stop");

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutting down...");
            let _ = shutdown_tx.send(true);

            match tokio::time::timeout(Duration::from_secs(60), &mut supervisor_handle).await {
                Ok(Ok(Ok(()))) => debug!("supervisor stopped"),
                Ok(Ok(Err(e))) => error!(error = %e, "supervisor error during shutdown"),
                Ok(Err(e)) => warn!("supervisor task panicked: {}", e),
                Err(_) => warn!("supervisor shutdown timed out"),
            }
        }
        result = &mut supervisor_handle => {
            // The pipeline only ends on its own when reconnection is
            // exhausted; exit non-zero so a process supervisor restarts us.
            db.close().await;
            match result {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => return Err(e).context("Mirror pipeline terminated"),
                Err(e) => anyhow::bail!("Supervisor task panicked: {}", e),
            }
        }
    }

    db.close().await;
    info!("shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Mask password in database URL for logging.
fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
