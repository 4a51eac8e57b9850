//! PostgreSQL storage adapter.
//!
//! Implements the store ports defined in `gavel-core`:
//!
//! - [`Database`] - connection pool and embedded schema
//! - [`PgStores`] - composite store implementing the `Stores` trait,
//!   including the single-transaction per-block projection
//! - Individual stores: [`PgBlockStore`], [`PgAuctionStore`],
//!   [`PgSettingsStore`]

mod auction_store;
mod block_store;
mod database;
mod helpers;
mod settings_store;

pub use auction_store::PgAuctionStore;
pub use block_store::PgBlockStore;
pub use database::{Database, DatabaseConfig};
pub use settings_store::PgSettingsStore;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use gavel_core::error::{StorageError, StorageResult};
use gavel_core::models::BlockProjection;
use gavel_core::ports::{AuctionStore, BlockStore, SettingsStore, Stores};

// =============================================================================
// Composite store
// =============================================================================

/// Aggregated PostgreSQL stores implementing the `Stores` trait.
///
/// One block's projection is applied in a single transaction so a
/// partial projection never becomes visible.
pub struct PgStores {
    db: Arc<Database>,
    blocks: PgBlockStore,
    auctions: PgAuctionStore,
    settings: PgSettingsStore,
}

impl PgStores {
    /// Create the store aggregate from a database connection.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            blocks: PgBlockStore::new(&db),
            auctions: PgAuctionStore::new(&db),
            settings: PgSettingsStore::new(&db),
            db,
        }
    }
}

#[async_trait]
impl Stores for PgStores {
    fn blocks(&self) -> &dyn BlockStore {
        &self.blocks
    }

    fn auctions(&self) -> &dyn AuctionStore {
        &self.auctions
    }

    fn settings(&self) -> &dyn SettingsStore {
        &self.settings
    }

    async fn project_block_atomic(&self, projection: &BlockProjection) -> StorageResult<()> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::Transaction(e.to_string()))?;

        // Auction snapshots: update-on-conflict per (collection, item, block).
        for auction in &projection.auctions {
            sqlx::query(auction_store::UPSERT_AUCTION)
                .bind(auction.collection_id as i64)
                .bind(auction.item_id as i64)
                .bind(&auction.owner_account)
                .bind(auction.start_block as i64)
                .bind(auction.highest_bid.to_string())
                .bind(&auction.highest_bidder)
                .bind(auction.ended)
                .bind(auction.observed_at_block as i64)
                .bind(auction.indexed_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        // Bid sets are replaced wholesale. The delete covers every key
        // observed in this projection, including auctions whose bid
        // list is now empty, so no stale bid survives a re-index.
        let mut bid_keys: BTreeSet<(u32, u32)> = projection
            .bids
            .iter()
            .map(|b| (b.collection_id, b.item_id))
            .collect();
        bid_keys.extend(
            projection
                .auctions
                .iter()
                .map(|a| (a.collection_id, a.item_id)),
        );

        for (collection_id, item_id) in bid_keys {
            sqlx::query(auction_store::DELETE_BIDS)
                .bind(collection_id as i64)
                .bind(item_id as i64)
                .bind(projection.block_number as i64)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        for bid in &projection.bids {
            sqlx::query(auction_store::INSERT_BID)
                .bind(bid.collection_id as i64)
                .bind(bid.item_id as i64)
                .bind(bid.observed_at_block as i64)
                .bind(bid.bid_index as i32)
                .bind(&bid.bidder_account)
                .bind(bid.amount.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        // Status flags: same upsert discipline as auctions.
        for status in &projection.status_flags {
            sqlx::query(auction_store::UPSERT_STATUS)
                .bind(status.collection_id as i64)
                .bind(status.item_id as i64)
                .bind(status.in_auction)
                .bind(status.observed_at_block as i64)
                .bind(status.indexed_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        // Settings: keyed by name alone.
        for setting in &projection.settings {
            sqlx::query(settings_store::UPSERT_SETTING)
                .bind(&setting.setting_name)
                .bind(&setting.setting_value)
                .bind(setting.observed_at_block as i64)
                .bind(setting.indexed_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Transaction(e.to_string()))?;

        debug!(
            block = projection.block_number,
            auctions = projection.auctions.len(),
            bids = projection.bids.len(),
            "projection applied"
        );
        Ok(())
    }
}
