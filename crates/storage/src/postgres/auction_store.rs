//! Auction store implementation for PostgreSQL.
//!
//! Covers the three auction-shaped tables: `auctions` and
//! `auction_status` (update-on-conflict keyed by collection/item/block)
//! and `bids` (delete-then-insert replace of the full set).

use async_trait::async_trait;
use sqlx::PgPool;

use gavel_core::error::{StorageError, StorageResult};
use gavel_core::models::{AuctionData, AuctionRow, BidRow, StatusRow};
use gavel_core::ports::AuctionStore;

use super::database::Database;
use super::helpers::parse_amount;

/// PostgreSQL implementation of [`AuctionStore`].
pub struct PgAuctionStore {
    pool: PgPool,
}

impl PgAuctionStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl AuctionStore for PgAuctionStore {
    async fn upsert_auction(&self, row: &AuctionRow) -> StorageResult<()> {
        sqlx::query(UPSERT_AUCTION)
            .bind(row.collection_id as i64)
            .bind(row.item_id as i64)
            .bind(&row.owner_account)
            .bind(row.start_block as i64)
            .bind(row.highest_bid.to_string())
            .bind(&row.highest_bidder)
            .bind(row.ended)
            .bind(row.observed_at_block as i64)
            .bind(row.indexed_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn replace_bids(
        &self,
        collection_id: u32,
        item_id: u32,
        observed_at_block: u64,
        bids: &[BidRow],
    ) -> StorageResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Transaction(e.to_string()))?;

        sqlx::query(DELETE_BIDS)
            .bind(collection_id as i64)
            .bind(item_id as i64)
            .bind(observed_at_block as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        for bid in bids {
            sqlx::query(INSERT_BID)
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

        tx.commit()
            .await
            .map_err(|e| StorageError::Transaction(e.to_string()))?;
        Ok(())
    }

    async fn upsert_status(&self, row: &StatusRow) -> StorageResult<()> {
        sqlx::query(UPSERT_STATUS)
            .bind(row.collection_id as i64)
            .bind(row.item_id as i64)
            .bind(row.in_auction)
            .bind(row.observed_at_block as i64)
            .bind(row.indexed_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn auction_data(
        &self,
        collection_id: u32,
        item_id: u32,
        at_block: Option<u64>,
    ) -> StorageResult<AuctionData> {
        let auction = self
            .fetch_auction(collection_id, item_id, at_block)
            .await?;

        // Bids and status are read at the same observation as the
        // auction row when the caller didn't pin a block.
        let effective_block = at_block.or_else(|| {
            auction
                .as_ref()
                .map(|a| a.observed_at_block)
        });

        let bids = match effective_block {
            Some(block) => self.fetch_bids(collection_id, item_id, block).await?,
            None => Vec::new(),
        };

        let in_auction = self
            .fetch_status(collection_id, item_id, at_block)
            .await?;

        Ok(AuctionData {
            auction,
            bids,
            in_auction,
        })
    }

    async fn active_auctions(&self) -> StorageResult<Vec<AuctionRow>> {
        let rows = sqlx::query_as::<_, AuctionDbRow>(
            r#"
            SELECT collection_id, item_id, owner_account, start_block,
                   highest_bid::TEXT, highest_bidder, ended,
                   observed_at_block, indexed_at
            FROM (
                SELECT DISTINCT ON (collection_id, item_id) *
                FROM auctions
                ORDER BY collection_id, item_id, observed_at_block DESC
            ) latest
            WHERE ended = FALSE
            ORDER BY collection_id, item_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.into_iter().map(AuctionDbRow::into_row).collect()
    }
}

impl PgAuctionStore {
    async fn fetch_auction(
        &self,
        collection_id: u32,
        item_id: u32,
        at_block: Option<u64>,
    ) -> StorageResult<Option<AuctionRow>> {
        let base = r#"
            SELECT collection_id, item_id, owner_account, start_block,
                   highest_bid::TEXT, highest_bidder, ended,
                   observed_at_block, indexed_at
            FROM auctions
            WHERE collection_id = $1 AND item_id = $2
        "#;

        let row = match at_block {
            Some(block) => {
                let query = format!("{} AND observed_at_block = $3", base);
                sqlx::query_as::<_, AuctionDbRow>(&query)
                    .bind(collection_id as i64)
                    .bind(item_id as i64)
                    .bind(block as i64)
                    .fetch_optional(&self.pool)
                    .await
            }
            None => {
                let query = format!("{} ORDER BY observed_at_block DESC LIMIT 1", base);
                sqlx::query_as::<_, AuctionDbRow>(&query)
                    .bind(collection_id as i64)
                    .bind(item_id as i64)
                    .fetch_optional(&self.pool)
                    .await
            }
        }
        .map_err(|e| StorageError::Query(e.to_string()))?;

        row.map(AuctionDbRow::into_row).transpose()
    }

    async fn fetch_bids(
        &self,
        collection_id: u32,
        item_id: u32,
        observed_at_block: u64,
    ) -> StorageResult<Vec<BidRow>> {
        let rows = sqlx::query_as::<_, BidDbRow>(
            r#"
            SELECT collection_id, item_id, observed_at_block, bid_index,
                   bidder_account, amount::TEXT
            FROM bids
            WHERE collection_id = $1 AND item_id = $2 AND observed_at_block = $3
            ORDER BY bid_index ASC
            "#,
        )
        .bind(collection_id as i64)
        .bind(item_id as i64)
        .bind(observed_at_block as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.into_iter().map(BidDbRow::into_row).collect()
    }

    async fn fetch_status(
        &self,
        collection_id: u32,
        item_id: u32,
        at_block: Option<u64>,
    ) -> StorageResult<Option<bool>> {
        let row: Option<(bool,)> = match at_block {
            Some(block) => {
                sqlx::query_as(
                    r#"
                    SELECT in_auction FROM auction_status
                    WHERE collection_id = $1 AND item_id = $2 AND observed_at_block = $3
                    "#,
                )
                .bind(collection_id as i64)
                .bind(item_id as i64)
                .bind(block as i64)
                .fetch_optional(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT in_auction FROM auction_status
                    WHERE collection_id = $1 AND item_id = $2
                    ORDER BY observed_at_block DESC LIMIT 1
                    "#,
                )
                .bind(collection_id as i64)
                .bind(item_id as i64)
                .fetch_optional(&self.pool)
                .await
            }
        }
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(row.map(|(in_auction,)| in_auction))
    }
}

// =============================================================================
// Statements (shared with the per-block transaction in mod.rs)
// =============================================================================

pub(crate) const UPSERT_AUCTION: &str = r#"
    INSERT INTO auctions (
        collection_id, item_id, owner_account, start_block,
        highest_bid, highest_bidder, ended, observed_at_block, indexed_at
    )
    VALUES ($1, $2, $3, $4, $5::NUMERIC, $6, $7, $8, $9)
    ON CONFLICT (collection_id, item_id, observed_at_block) DO UPDATE SET
        owner_account = EXCLUDED.owner_account,
        start_block = EXCLUDED.start_block,
        highest_bid = EXCLUDED.highest_bid,
        highest_bidder = EXCLUDED.highest_bidder,
        ended = EXCLUDED.ended,
        indexed_at = EXCLUDED.indexed_at
"#;

pub(crate) const UPSERT_STATUS: &str = r#"
    INSERT INTO auction_status (
        collection_id, item_id, in_auction, observed_at_block, indexed_at
    )
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (collection_id, item_id, observed_at_block) DO UPDATE SET
        in_auction = EXCLUDED.in_auction,
        indexed_at = EXCLUDED.indexed_at
"#;

pub(crate) const DELETE_BIDS: &str = r#"
    DELETE FROM bids
    WHERE collection_id = $1 AND item_id = $2 AND observed_at_block = $3
"#;

pub(crate) const INSERT_BID: &str = r#"
    INSERT INTO bids (
        collection_id, item_id, observed_at_block, bid_index,
        bidder_account, amount
    )
    VALUES ($1, $2, $3, $4, $5, $6::NUMERIC)
"#;

// =============================================================================
// Row mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct AuctionDbRow {
    collection_id: i64,
    item_id: i64,
    owner_account: String,
    start_block: i64,
    highest_bid: String,
    highest_bidder: Option<String>,
    ended: bool,
    observed_at_block: i64,
    indexed_at: chrono::DateTime<chrono::Utc>,
}

impl AuctionDbRow {
    fn into_row(self) -> StorageResult<AuctionRow> {
        Ok(AuctionRow {
            collection_id: self.collection_id as u32,
            item_id: self.item_id as u32,
            owner_account: self.owner_account,
            start_block: self.start_block as u64,
            highest_bid: parse_amount(&self.highest_bid, "auction.highest_bid")?,
            highest_bidder: self.highest_bidder,
            ended: self.ended,
            observed_at_block: self.observed_at_block as u64,
            indexed_at: self.indexed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BidDbRow {
    collection_id: i64,
    item_id: i64,
    observed_at_block: i64,
    bid_index: i32,
    bidder_account: String,
    amount: String,
}

impl BidDbRow {
    fn into_row(self) -> StorageResult<BidRow> {
        Ok(BidRow {
            collection_id: self.collection_id as u32,
            item_id: self.item_id as u32,
            observed_at_block: self.observed_at_block as u64,
            bid_index: self.bid_index as u32,
            bidder_account: self.bidder_account,
            amount: parse_amount(&self.amount, "bid.amount")?,
        })
    }
}
