//! Domain models for the mirrored auction state.
//!
//! These models are storage-agnostic: the snapshot shapes are what the
//! chain adapter extracts from pallet storage at a given block, the row
//! shapes are what the storage adapter persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Block hash
// =============================================================================

/// 32-byte block hash (Blake2-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    /// Parse from hex string (with or without 0x prefix).
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }

    /// Convert to 0x-prefixed hex string.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Get the inner bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for BlockHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for BlockHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// =============================================================================
// Chain data
// =============================================================================

/// Per-block descriptor delivered by the head subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Block number (height).
    pub number: u64,
    /// Block hash.
    pub hash: BlockHash,
    /// Parent block hash.
    pub parent_hash: BlockHash,
    /// Number of extrinsics in the block.
    pub extrinsics_count: u32,
}

/// Mirrored block record. Written once per height, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Block number (height, unique).
    pub number: u64,
    /// Block hash.
    pub hash: BlockHash,
    /// Parent block hash.
    pub parent_hash: BlockHash,
    /// Number of extrinsics in the block.
    pub extrinsics_count: u32,
    /// When this block was indexed.
    pub indexed_at: DateTime<Utc>,
}

impl Block {
    /// Build the block record for a freshly delivered header.
    pub fn from_header(header: &Header, indexed_at: DateTime<Utc>) -> Self {
        Self {
            number: header.number,
            hash: header.hash.clone(),
            parent_hash: header.parent_hash.clone(),
            extrinsics_count: header.extrinsics_count,
            indexed_at,
        }
    }
}

// =============================================================================
// Storage snapshot (extraction output)
// =============================================================================

/// One auction as it exists in pallet storage at a given block.
///
/// Mirrors the pallet's `AuctionInfo` value. Accounts are carried as
/// canonical SS58 strings; balances as u128 smallest units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionState {
    pub collection_id: u32,
    pub item_id: u32,
    pub owner: String,
    pub start_block: u64,
    pub highest_bid: u128,
    pub highest_bidder: Option<String>,
    pub ended: bool,
}

/// A single entry of an auction's bid list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidEntry {
    pub bidder: String,
    pub amount: u128,
}

/// The complete bid list of one auction, in chain-side order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidList {
    pub collection_id: u32,
    pub item_id: u32,
    pub bids: Vec<BidEntry>,
}

/// The in-auction flag of one collection/item pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlag {
    pub collection_id: u32,
    pub item_id: u32,
    pub in_auction: bool,
}

/// Full pallet storage snapshot as observed at one block hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    pub auctions: Vec<AuctionState>,
    pub bids: Vec<BidList>,
    pub status_flags: Vec<StatusFlag>,
    pub fee_percentage: u8,
    pub accumulated_fees: u128,
}

// =============================================================================
// Row shapes (projection output)
// =============================================================================

/// Setting key for the pallet fee percentage.
pub const SETTING_FEE_PERCENTAGE: &str = "fee_percentage";
/// Setting key for the accumulated pallet fees.
pub const SETTING_ACCUMULATED_FEES: &str = "accumulated_fees";

/// Auction snapshot row, keyed by (collection_id, item_id, observed_at_block).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionRow {
    pub collection_id: u32,
    pub item_id: u32,
    pub owner_account: String,
    pub start_block: u64,
    pub highest_bid: u128,
    pub highest_bidder: Option<String>,
    pub ended: bool,
    pub observed_at_block: u64,
    pub indexed_at: DateTime<Utc>,
}

/// One bid row. `bid_index` preserves the chain-side list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidRow {
    pub collection_id: u32,
    pub item_id: u32,
    pub observed_at_block: u64,
    pub bid_index: u32,
    pub bidder_account: String,
    pub amount: u128,
}

/// In-auction flag row, same key discipline as [`AuctionRow`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRow {
    pub collection_id: u32,
    pub item_id: u32,
    pub in_auction: bool,
    pub observed_at_block: u64,
    pub indexed_at: DateTime<Utc>,
}

/// Pallet setting row, keyed by name alone. Always reflects the most
/// recently observed block's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingRow {
    pub setting_name: String,
    pub setting_value: String,
    pub observed_at_block: u64,
    pub indexed_at: DateTime<Utc>,
}

/// All rows produced by projecting one block's storage snapshot.
///
/// Applied as a single logical unit by the row store.
#[derive(Debug, Clone, Default)]
pub struct BlockProjection {
    pub block_number: u64,
    pub auctions: Vec<AuctionRow>,
    pub bids: Vec<BidRow>,
    pub status_flags: Vec<StatusRow>,
    pub settings: Vec<SettingRow>,
}

// =============================================================================
// Query results
// =============================================================================

/// Point-lookup result for one collection/item pair.
///
/// `in_auction` is `None` when no status flag was ever observed for the
/// key, which is distinct from an explicit `Some(false)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionData {
    pub auction: Option<AuctionRow>,
    pub bids: Vec<BidRow>,
    pub in_auction: Option<bool>,
}

// =============================================================================
// Tests
// =============================================================================
