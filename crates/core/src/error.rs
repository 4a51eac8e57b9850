//! Error types for the mirror pipeline.
//!
//! Three layers, matching the failure taxonomy of the pipeline:
//!
//! - [`ChainError`] - RPC connectivity and storage extraction errors
//! - [`StorageError`] - database/row-store errors
//! - [`IndexerError`] - top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations, allowing
//! `?` to work across layer boundaries.

use thiserror::Error;

// =============================================================================
// Chain Errors
// =============================================================================

/// Chain RPC and extraction errors.
///
/// `ConnectionFailed` and `SubscriptionDropped` drive the supervisor's
/// reconnect path; the remaining variants abort a single block's
/// extraction and are handled by the indexer's failure policy.
#[derive(Debug, Error)]
pub enum ChainError {
    /// WebSocket connection could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The head subscription could not be created or was dropped
    /// mid-session. An internal reconnect trigger, never surfaced to
    /// callers as a pipeline failure.
    #[error("Subscription dropped: {0}")]
    SubscriptionDropped(String),

    /// A storage query failed for a specific block.
    #[error("Storage query failed at block {block}: {message}")]
    StorageQuery {
        /// Hex block hash the query targeted.
        block: String,
        /// Error details.
        message: String,
    },

    /// A storage key or value could not be decoded.
    #[error("Decode error in {what}: {message}")]
    Decode {
        /// Which storage item was being decoded.
        what: &'static str,
        /// Error details.
        message: String,
    },
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Database and row-store errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish a database connection.
    #[error("Database connection error: {0}")]
    Connection(String),

    /// SQL query execution failed.
    #[error("Query execution error: {0}")]
    Query(String),

    /// Transaction begin/commit failed.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Row data could not be converted to/from domain values.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

// =============================================================================
// Indexer Errors
// =============================================================================

/// Top-level pipeline errors.
///
/// Returned by [`crate::services::ConnectionSupervisor::run`]. All
/// variants except `ReconnectExhausted` are recoverable within the
/// pipeline's own policies.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Chain connectivity or extraction error.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Row-store error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The reconnect attempt budget was exhausted.
    ///
    /// The only unrecoverable condition: the process terminates so an
    /// operator or supervisor process can restart it.
    #[error("Reconnect budget exhausted after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of failed reconnect attempts.
        attempts: u32,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IndexerError {
    /// Whether this error must terminate the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IndexerError::ReconnectExhausted { .. })
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for pipeline operations.
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Result type for row-store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
