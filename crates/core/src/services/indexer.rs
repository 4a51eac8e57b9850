//! Block indexer - projects one block's pallet storage into rows.
//!
//! # Flow
//!
//! 1. Insert-ignore the block record keyed by number
//! 2. Extract the pallet storage snapshot at the block's hash
//! 3. Project the snapshot into auction/bid/status/settings rows
//! 4. Apply the projection atomically
//!
//! Each step is independently idempotent, so re-delivering a header
//! leaves the mirrored state unchanged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::error::IndexerResult;
use crate::metrics::{record_block_abandoned, record_block_mirrored, ProjectionTimer};
use crate::models::{
    AuctionRow, BidRow, Block, BlockProjection, Header, SettingRow, StatusRow, StorageSnapshot,
    SETTING_ACCUMULATED_FEES, SETTING_FEE_PERCENTAGE,
};
use crate::ports::{ChainSource, FailureAction, FailurePolicy, Stores};

/// Projects observed blocks into the row store.
///
/// Errors never escape [`index`](Self::index): a failed block is routed
/// through the configured [`FailurePolicy`] and the pipeline moves on.
pub struct BlockIndexer {
    stores: Arc<dyn Stores>,
    policy: Arc<dyn FailurePolicy>,
}

impl BlockIndexer {
    pub fn new(stores: Arc<dyn Stores>, policy: Arc<dyn FailurePolicy>) -> Self {
        Self { stores, policy }
    }

    /// Index one observed header. Never propagates errors.
    pub async fn index(&self, source: &dyn ChainSource, header: &Header) {
        let mut attempt = 0u32;
        loop {
            match self.index_once(source, header).await {
                Ok(()) => {
                    record_block_mirrored();
                    info!(block = header.number, "block mirrored");
                    return;
                }
                Err(e) => {
                    attempt += 1;
                    match self.policy.on_failure(header.number, attempt, &e).await {
                        FailureAction::Retry => {
                            warn!(
                                block = header.number,
                                attempt,
                                error = %e,
                                "block indexing failed, retrying"
                            );
                        }
                        FailureAction::Skip => {
                            record_block_abandoned();
                            error!(
                                block = header.number,
                                attempt,
                                error = %e,
                                "block indexing failed, abandoning block"
                            );
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn index_once(&self, source: &dyn ChainSource, header: &Header) -> IndexerResult<()> {
        let _timer = ProjectionTimer::new();
        let indexed_at = Utc::now();

        let block = Block::from_header(header, indexed_at);
        let written = self.stores.blocks().insert_block(&block).await?;
        if !written {
            debug!(block = header.number, "block row already present");
        }

        let snapshot = source.snapshot_at(&header.hash).await?;
        debug!(
            block = header.number,
            auctions = snapshot.auctions.len(),
            bid_lists = snapshot.bids.len(),
            "storage snapshot extracted"
        );

        let projection = project(header.number, &snapshot, indexed_at);
        self.stores.project_block_atomic(&projection).await?;
        Ok(())
    }
}

/// Map one storage snapshot to the rows it produces at `block_number`.
pub fn project(
    block_number: u64,
    snapshot: &StorageSnapshot,
    indexed_at: DateTime<Utc>,
) -> BlockProjection {
    let auctions = snapshot
        .auctions
        .iter()
        .map(|a| AuctionRow {
            collection_id: a.collection_id,
            item_id: a.item_id,
            owner_account: a.owner.clone(),
            start_block: a.start_block,
            highest_bid: a.highest_bid,
            highest_bidder: a.highest_bidder.clone(),
            ended: a.ended,
            observed_at_block: block_number,
            indexed_at,
        })
        .collect();

    let bids = snapshot
        .bids
        .iter()
        .flat_map(|list| {
            list.bids.iter().enumerate().map(move |(i, bid)| BidRow {
                collection_id: list.collection_id,
                item_id: list.item_id,
                observed_at_block: block_number,
                bid_index: i as u32,
                bidder_account: bid.bidder.clone(),
                amount: bid.amount,
            })
        })
        .collect();

    let status_flags = snapshot
        .status_flags
        .iter()
        .map(|flag| StatusRow {
            collection_id: flag.collection_id,
            item_id: flag.item_id,
            in_auction: flag.in_auction,
            observed_at_block: block_number,
            indexed_at,
        })
        .collect();

    let settings = vec![
        SettingRow {
            setting_name: SETTING_FEE_PERCENTAGE.to_string(),
            setting_value: snapshot.fee_percentage.to_string(),
            observed_at_block: block_number,
            indexed_at,
        },
        SettingRow {
            setting_name: SETTING_ACCUMULATED_FEES.to_string(),
            setting_value: snapshot.accumulated_fees.to_string(),
            observed_at_block: block_number,
            indexed_at,
        },
    ];

    BlockProjection {
        block_number,
        auctions,
        bids,
        status_flags,
        settings,
    }
}
