//! Port traits for the chain connection.
//!
//! The supervisor owns the connection lifecycle through these traits.
//! Implementations live in the infrastructure layer (`gavel-substrate`).

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::ChainResult;
use crate::models::{BlockHash, Header, StorageSnapshot};

/// Stream of newly produced block headers, in chain order.
pub type HeadStream = Pin<Box<dyn Stream<Item = ChainResult<Header>> + Send>>;

/// Which chain head the subscription follows.
///
/// Whether the mirrored state should come from *best* or *finalized*
/// blocks is an open question inherited from the source system: with
/// `Best` (the observed default) the mirror may include state from
/// blocks later excluded from the canonical chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadMode {
    /// Follow best blocks (fast, may be reverted).
    #[default]
    Best,
    /// Follow finalized blocks only (slower, never reverted).
    Finalized,
}

/// Factory for chain connections.
///
/// Each call establishes a fresh connection; the supervisor calls it on
/// startup and again after every transport drop.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    /// Connect to the chain endpoint.
    async fn connect(&self) -> ChainResult<Box<dyn ChainSource>>;
}

/// One live chain connection.
///
/// Dropping a [`HeadStream`] cancels its subscription; the supervisor
/// relies on this to tear the old subscription down before re-arming.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Get the genesis hash of the connected chain.
    async fn genesis_hash(&self) -> ChainResult<BlockHash>;

    /// Subscribe to newly produced block headers.
    async fn subscribe_heads(&self) -> ChainResult<HeadStream>;

    /// Read the auction pallet's storage as it existed at the given
    /// block hash. Repeated calls for the same historical hash are fully
    /// reproducible.
    async fn snapshot_at(&self, hash: &BlockHash) -> ChainResult<StorageSnapshot>;
}
