//! Port traits for the row store.
//!
//! These traits define the storage interface used by the pipeline.
//! Implementations live in the infrastructure layer (`gavel-storage`).

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::models::{
    AuctionData, AuctionRow, BidRow, Block, BlockHash, BlockProjection, SettingRow, StatusRow,
};

/// Store for mirrored block records.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Insert a block record, ignoring the write if the height already
    /// exists. Returns whether a row was actually written.
    async fn insert_block(&self, block: &Block) -> StorageResult<bool>;

    /// Get a block by number.
    async fn get_block(&self, number: u64) -> StorageResult<Option<Block>>;

    /// Resolve a block hash to its number, if mirrored.
    async fn block_number_by_hash(&self, hash: &BlockHash) -> StorageResult<Option<u64>>;

    /// Highest mirrored block number.
    async fn latest_block_number(&self) -> StorageResult<Option<u64>>;
}

/// Store for auction snapshots, bid lists and status flags.
#[async_trait]
pub trait AuctionStore: Send + Sync {
    /// Upsert an auction snapshot row keyed by
    /// (collection_id, item_id, observed_at_block).
    async fn upsert_auction(&self, row: &AuctionRow) -> StorageResult<()>;

    /// Replace the full bid set for one
    /// (collection_id, item_id, observed_at_block) key: delete whatever
    /// was recorded for that exact key, then insert `bids`.
    async fn replace_bids(
        &self,
        collection_id: u32,
        item_id: u32,
        observed_at_block: u64,
        bids: &[BidRow],
    ) -> StorageResult<()>;

    /// Upsert a status flag row, same key discipline as auctions.
    async fn upsert_status(&self, row: &StatusRow) -> StorageResult<()>;

    /// Point lookup for one collection/item pair at a specific observed
    /// block, or at the latest observation when `at_block` is `None`.
    async fn auction_data(
        &self,
        collection_id: u32,
        item_id: u32,
        at_block: Option<u64>,
    ) -> StorageResult<AuctionData>;

    /// Latest observation of every auction that has not ended.
    async fn active_auctions(&self) -> StorageResult<Vec<AuctionRow>>;
}

/// Store for pallet settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Upsert a setting keyed by name alone, overwriting any prior value
    /// regardless of block ordering.
    async fn upsert_setting(&self, row: &SettingRow) -> StorageResult<()>;

    /// Get a setting by name.
    async fn get_setting(&self, name: &str) -> StorageResult<Option<SettingRow>>;
}

/// Combined store access for the pipeline.
///
/// Provides the individual stores plus the atomic projection operation
/// that spans all auction tables.
#[async_trait]
pub trait Stores: Send + Sync {
    /// Access the block store.
    fn blocks(&self) -> &dyn BlockStore;

    /// Access the auction store.
    fn auctions(&self) -> &dyn AuctionStore;

    /// Access the settings store.
    fn settings(&self) -> &dyn SettingsStore;

    /// Apply one block's full projection as a single logical unit.
    ///
    /// Covers the auction upserts, the bid delete+reinsert, the status
    /// upserts and the settings upserts. A partial projection must not
    /// become visible.
    async fn project_block_atomic(&self, projection: &BlockProjection) -> StorageResult<()>;

    /// Point lookup, optionally historical: with a block hash the lookup
    /// is pinned to that block's observation (via the blocks table); an
    /// unmirrored hash yields an empty result.
    async fn auction_data_at(
        &self,
        collection_id: u32,
        item_id: u32,
        block_hash: Option<&BlockHash>,
    ) -> StorageResult<AuctionData> {
        let at_block = match block_hash {
            Some(hash) => match self.blocks().block_number_by_hash(hash).await? {
                Some(number) => Some(number),
                None => {
                    return Ok(AuctionData {
                        auction: None,
                        bids: Vec::new(),
                        in_auction: None,
                    });
                }
            },
            None => None,
        };
        self.auctions()
            .auction_data(collection_id, item_id, at_block)
            .await
    }
}
