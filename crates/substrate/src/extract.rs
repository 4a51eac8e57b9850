//! Storage extractor for the auction pallet.
//!
//! Reads the pallet's storage maps and values as they existed at a
//! specific block hash, so re-indexing a historical header is fully
//! reproducible. Storage is addressed dynamically and values are
//! SCALE-decoded into the raw layouts below; composite map keys are
//! decoded from the raw key bytes and carried through unchanged.

use codec::Decode;
use futures::StreamExt;
use subxt::dynamic::Value;
use subxt::utils::{AccountId32, H256};
use subxt::{OnlineClient, PolkadotConfig};
use tracing::debug;

use gavel_core::error::{ChainError, ChainResult};
use gavel_core::models::{
    AuctionState, BidEntry, BidList, BlockHash, StatusFlag, StorageSnapshot,
};

/// On-chain pallet whose storage is mirrored.
const PALLET: &str = "NftAuction";

/// SCALE layout of the pallet's `AuctionInfo` storage value.
#[derive(Decode)]
struct RawAuctionInfo {
    owner: AccountId32,
    start_block: u32,
    highest_bid: u128,
    highest_bidder: Option<AccountId32>,
    ended: bool,
}

/// Read the full pallet snapshot at `hash`.
pub(crate) async fn snapshot_at(
    client: &OnlineClient<PolkadotConfig>,
    hash: &BlockHash,
) -> ChainResult<StorageSnapshot> {
    let storage = client.storage().at(H256(hash.0));

    let mut auctions = Vec::new();
    let addr = subxt::dynamic::storage(PALLET, "Auctions", Vec::<Value>::new());
    let mut iter = storage
        .iter(addr)
        .await
        .map_err(|e| storage_query(hash, e))?;
    while let Some(kv) = iter.next().await {
        let kv = kv.map_err(|e| storage_query(hash, e))?;
        let (collection_id, item_id) = decode_map_key(&kv.key_bytes, "Auctions")?;
        let bytes = kv.value.into_encoded();
        let raw = RawAuctionInfo::decode(&mut &bytes[..])
            .map_err(|e| decode_error("Auctions", e))?;
        auctions.push(AuctionState {
            collection_id,
            item_id,
            owner: raw.owner.to_string(),
            start_block: u64::from(raw.start_block),
            highest_bid: raw.highest_bid,
            highest_bidder: raw.highest_bidder.map(|account| account.to_string()),
            ended: raw.ended,
        });
    }

    let mut bids = Vec::new();
    let addr = subxt::dynamic::storage(PALLET, "Bids", Vec::<Value>::new());
    let mut iter = storage
        .iter(addr)
        .await
        .map_err(|e| storage_query(hash, e))?;
    while let Some(kv) = iter.next().await {
        let kv = kv.map_err(|e| storage_query(hash, e))?;
        let (collection_id, item_id) = decode_map_key(&kv.key_bytes, "Bids")?;
        let bytes = kv.value.into_encoded();
        // A BoundedVec encodes identically to a plain Vec.
        let list = <Vec<(AccountId32, u128)>>::decode(&mut &bytes[..])
            .map_err(|e| decode_error("Bids", e))?;
        bids.push(BidList {
            collection_id,
            item_id,
            bids: list
                .into_iter()
                .map(|(bidder, amount)| BidEntry {
                    bidder: bidder.to_string(),
                    amount,
                })
                .collect(),
        });
    }

    let mut status_flags = Vec::new();
    let addr = subxt::dynamic::storage(PALLET, "InAuction", Vec::<Value>::new());
    let mut iter = storage
        .iter(addr)
        .await
        .map_err(|e| storage_query(hash, e))?;
    while let Some(kv) = iter.next().await {
        let kv = kv.map_err(|e| storage_query(hash, e))?;
        let (collection_id, item_id) = decode_map_key(&kv.key_bytes, "InAuction")?;
        let bytes = kv.value.into_encoded();
        let in_auction =
            bool::decode(&mut &bytes[..]).map_err(|e| decode_error("InAuction", e))?;
        status_flags.push(StatusFlag {
            collection_id,
            item_id,
            in_auction,
        });
    }

    // Both settings are ValueQuery items; an absent key means the
    // default value, not an error.
    let fee_percentage = fetch_value::<u8>(&storage, hash, "FeePercentage").await?;
    let accumulated_fees = fetch_value::<u128>(&storage, hash, "AccumulatedFees").await?;

    debug!(
        block = %hash,
        auctions = auctions.len(),
        bid_lists = bids.len(),
        flags = status_flags.len(),
        "pallet snapshot extracted"
    );

    Ok(StorageSnapshot {
        auctions,
        bids,
        status_flags,
        fee_percentage,
        accumulated_fees,
    })
}

/// Fetch and decode a plain storage value, defaulting when absent.
async fn fetch_value<T: Decode + Default>(
    storage: &subxt::storage::Storage<PolkadotConfig, OnlineClient<PolkadotConfig>>,
    hash: &BlockHash,
    entry: &'static str,
) -> ChainResult<T> {
    let addr = subxt::dynamic::storage(PALLET, entry, Vec::<Value>::new());
    match storage
        .fetch(&addr)
        .await
        .map_err(|e| storage_query(hash, e))?
    {
        Some(thunk) => {
            let bytes = thunk.into_encoded();
            T::decode(&mut &bytes[..]).map_err(|e| decode_error(entry, e))
        }
        None => Ok(T::default()),
    }
}

/// Decode the `(collection_id, item_id)` tuple out of a raw map key.
///
/// Blake2_128Concat key layout: 16-byte pallet prefix + 16-byte entry
/// prefix + 16-byte Blake2_128 hash + SCALE-encoded original key.
fn decode_map_key(key: &[u8], what: &'static str) -> ChainResult<(u32, u32)> {
    const PREFIX_LEN: usize = 32 + 16;

    if key.len() < PREFIX_LEN + 8 {
        return Err(ChainError::Decode {
            what,
            message: format!("storage key too short: {} bytes", key.len()),
        });
    }

    let mut tail = &key[PREFIX_LEN..];
    <(u32, u32)>::decode(&mut tail).map_err(|e| decode_error(what, e))
}

fn storage_query(hash: &BlockHash, e: subxt::Error) -> ChainError {
    ChainError::StorageQuery {
        block: hash.to_hex(),
        message: e.to_string(),
    }
}

fn decode_error(what: &'static str, e: codec::Error) -> ChainError {
    ChainError::Decode {
        what,
        message: e.to_string(),
    }
}
