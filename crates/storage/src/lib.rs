//! Storage layer for the Gavel auction mirror.
//!
//! This crate provides the PostgreSQL implementation of the store ports
//! defined in `gavel-core`: connection pooling, the embedded schema, and
//! the per-entity upsert/replace operations with their conflict
//! policies.
//!
//! # Usage
//!
//! ```ignore
//! use gavel_storage::{Database, DatabaseConfig, PgStores};
//!
//! let config = DatabaseConfig::for_mirror(&database_url);
//! let db = Database::connect(&config).await?;
//! db.init_schema().await?;
//!
//! let stores = Arc::new(PgStores::new(Arc::new(db)));
//! ```

pub mod postgres;

pub use postgres::{Database, DatabaseConfig, PgStores};
