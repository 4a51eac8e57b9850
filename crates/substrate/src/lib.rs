//! Substrate RPC adapter for the Gavel auction mirror.
//!
//! This crate implements the chain ports from `gavel-core` over
//! WebSocket RPC:
//!
//! - [`SubstrateConnector`] - establishes connections (one per
//!   supervisor (re)connect)
//! - [`SubstrateSource`] - head subscription plus the storage extractor
//!   reading the auction pallet at a historical block hash
//!
//! # Usage
//!
//! ```ignore
//! use gavel_substrate::{SubstrateConfig, SubstrateConnector};
//!
//! let connector = SubstrateConnector::new(SubstrateConfig {
//!     ws_url: "ws://localhost:9944".to_string(),
//!     head_mode: HeadMode::Best,
//! });
//!
//! let source = connector.connect().await?;
//! let mut heads = source.subscribe_heads().await?;
//! ```
//!
//! Storage is read with subxt's dynamic addresses (no compile-time
//! metadata), so the mirror runs against any runtime that carries the
//! auction pallet with its standard storage layout.

mod client;
mod extract;

pub use client::{SubstrateConfig, SubstrateConnector, SubstrateSource};
