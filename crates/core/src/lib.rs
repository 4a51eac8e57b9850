//! Core domain layer for the Gavel auction mirror.
//!
//! Gavel mirrors the on-chain storage of an NFT-auction pallet into
//! PostgreSQL so downstream consumers can query auction state without
//! talking to the chain. This crate contains the domain models, port
//! traits and services of that pipeline; it has no infrastructure
//! dependencies.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      gavel (binary)                         │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │       gavel-substrate        │        gavel-storage         │
//! │       (RPC + extract)        │        (PostgreSQL)          │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │                  gavel-core  ← YOU ARE HERE                 │
//! │                (models, ports, services)                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Domain models (blocks, snapshots, rows)
//! - [`ports`] - Interface traits for adapters to implement
//! - [`services`] - Pipeline logic (ConnectionSupervisor, BlockIndexer)
//! - [`error`] - Layered error types
//! - [`metrics`] - Metric definitions
//!
//! # Pipeline lifecycle
//!
//! 1. The supervisor connects and subscribes to new block headers
//! 2. Headers enter a bounded single-consumer queue (arrival order is
//!    processing order)
//! 3. The indexer extracts the pallet storage snapshot at each header's
//!    hash and projects it into rows
//! 4. The row store applies the projection atomically
//! 5. On disconnect the supervisor backs off, reconnects and re-arms
//!    the subscription; exhausting the attempt budget is fatal

pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;
