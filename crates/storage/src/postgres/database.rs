//! PostgreSQL database connection and schema.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};

use gavel_core::error::{StorageError, StorageResult};

/// Embedded schema, one statement per entry.
///
/// Applied at startup; every statement is idempotent. A versioned
/// migration framework is deliberately not part of this system.
const SCHEMA: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS blocks (
    number BIGINT PRIMARY KEY,
    hash BYTEA NOT NULL,
    parent_hash BYTEA NOT NULL,
    extrinsics_count INTEGER NOT NULL DEFAULT 0,
    indexed_at TIMESTAMPTZ NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS auctions (
    collection_id BIGINT NOT NULL,
    item_id BIGINT NOT NULL,
    owner_account TEXT NOT NULL,
    start_block BIGINT NOT NULL,
    highest_bid NUMERIC(39, 0) NOT NULL DEFAULT 0,
    highest_bidder TEXT,
    ended BOOLEAN NOT NULL DEFAULT FALSE,
    observed_at_block BIGINT NOT NULL,
    indexed_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (collection_id, item_id, observed_at_block)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS bids (
    collection_id BIGINT NOT NULL,
    item_id BIGINT NOT NULL,
    observed_at_block BIGINT NOT NULL,
    bid_index INTEGER NOT NULL,
    bidder_account TEXT NOT NULL,
    amount NUMERIC(39, 0) NOT NULL,
    PRIMARY KEY (collection_id, item_id, observed_at_block, bid_index)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS auction_status (
    collection_id BIGINT NOT NULL,
    item_id BIGINT NOT NULL,
    in_auction BOOLEAN NOT NULL,
    observed_at_block BIGINT NOT NULL,
    indexed_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (collection_id, item_id, observed_at_block)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS pallet_settings (
    setting_name TEXT PRIMARY KEY,
    setting_value TEXT NOT NULL,
    observed_at_block BIGINT NOT NULL,
    indexed_at TIMESTAMPTZ NOT NULL
)
"#,
    "CREATE INDEX IF NOT EXISTS idx_blocks_hash ON blocks(hash)",
    "CREATE INDEX IF NOT EXISTS idx_auctions_ended ON auctions(ended)",
    "CREATE INDEX IF NOT EXISTS idx_auctions_key ON auctions(collection_id, item_id)",
    "CREATE INDEX IF NOT EXISTS idx_bids_key ON bids(collection_id, item_id, observed_at_block)",
];

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// Connection acquisition timeout.
    pub acquire_timeout: Duration,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Maximum connection lifetime.
    pub max_lifetime: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/gavel".to_string(),
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl DatabaseConfig {
    /// Configuration sized for the mirror pipeline: a single writer plus
    /// a handful of reader connections.
    pub fn for_mirror(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to the database with the given configuration.
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        debug!(
            max_conn = config.max_connections,
            min_conn = config.min_connections,
            "creating connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        debug!("connection pool created");
        Ok(Self { pool })
    }

    /// Apply the embedded schema.
    pub async fn init_schema(&self) -> StorageResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }
        info!("schema ready");
        Ok(())
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
