//! Pipeline integration tests.
//!
//! Drives the real supervisor, queue and indexer over scripted mock
//! ports: a connector whose sessions are fed by test-held channels and
//! an in-memory store implementing the same conflict policies as the
//! PostgreSQL adapter.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use tokio::sync::watch;

use gavel_core::error::{ChainError, ChainResult, IndexerError, StorageResult};
use gavel_core::models::{
    AuctionData, AuctionRow, AuctionState, BidEntry, BidList, BidRow, Block, BlockHash,
    BlockProjection, Header, SettingRow, StatusFlag, StatusRow, StorageSnapshot,
    SETTING_FEE_PERCENTAGE,
};
use gavel_core::ports::{
    AuctionStore, BestEffort, BlockStore, BoundedRetry, ChainConnector, ChainSource,
    FailurePolicy, HeadStream, SettingsStore, Stores,
};
use gavel_core::services::{BlockIndexer, ConnectionSupervisor, SupervisorConfig};

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Default)]
struct MemState {
    blocks: BTreeMap<u64, Block>,
    auctions: BTreeMap<(u32, u32, u64), AuctionRow>,
    bids: BTreeMap<(u32, u32, u64), Vec<BidRow>>,
    status: BTreeMap<(u32, u32, u64), StatusRow>,
    settings: BTreeMap<String, SettingRow>,
    /// Block numbers in the order their projections were applied.
    projected_order: Vec<u64>,
}

#[derive(Default)]
struct MemStores {
    state: Mutex<MemState>,
    /// Extra latency per projection, to provoke ordering races.
    projection_delay: Option<Duration>,
}

impl MemStores {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_projection_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MemState::default()),
            projection_delay: Some(delay),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemState> {
        self.state.lock().expect("mem state poisoned")
    }

    fn projected_order(&self) -> Vec<u64> {
        self.lock().projected_order.clone()
    }

    fn block_count(&self) -> usize {
        self.lock().blocks.len()
    }
}

#[async_trait]
impl BlockStore for MemStores {
    async fn insert_block(&self, block: &Block) -> StorageResult<bool> {
        let mut state = self.lock();
        if state.blocks.contains_key(&block.number) {
            return Ok(false);
        }
        state.blocks.insert(block.number, block.clone());
        Ok(true)
    }

    async fn get_block(&self, number: u64) -> StorageResult<Option<Block>> {
        Ok(self.lock().blocks.get(&number).cloned())
    }

    async fn block_number_by_hash(&self, hash: &BlockHash) -> StorageResult<Option<u64>> {
        Ok(self
            .lock()
            .blocks
            .values()
            .find(|b| &b.hash == hash)
            .map(|b| b.number))
    }

    async fn latest_block_number(&self) -> StorageResult<Option<u64>> {
        Ok(self.lock().blocks.keys().next_back().copied())
    }
}

#[async_trait]
impl AuctionStore for MemStores {
    async fn upsert_auction(&self, row: &AuctionRow) -> StorageResult<()> {
        self.lock().auctions.insert(
            (row.collection_id, row.item_id, row.observed_at_block),
            row.clone(),
        );
        Ok(())
    }

    async fn replace_bids(
        &self,
        collection_id: u32,
        item_id: u32,
        observed_at_block: u64,
        bids: &[BidRow],
    ) -> StorageResult<()> {
        let mut state = self.lock();
        let key = (collection_id, item_id, observed_at_block);
        state.bids.remove(&key);
        if !bids.is_empty() {
            state.bids.insert(key, bids.to_vec());
        }
        Ok(())
    }

    async fn upsert_status(&self, row: &StatusRow) -> StorageResult<()> {
        self.lock().status.insert(
            (row.collection_id, row.item_id, row.observed_at_block),
            row.clone(),
        );
        Ok(())
    }

    async fn auction_data(
        &self,
        collection_id: u32,
        item_id: u32,
        at_block: Option<u64>,
    ) -> StorageResult<AuctionData> {
        let state = self.lock();
        let range = (collection_id, item_id, 0)..=(collection_id, item_id, u64::MAX);

        let auction = match at_block {
            Some(block) => state
                .auctions
                .get(&(collection_id, item_id, block))
                .cloned(),
            None => state
                .auctions
                .range(range.clone())
                .next_back()
                .map(|(_, row)| row.clone()),
        };

        let effective_block = at_block.or_else(|| auction.as_ref().map(|a| a.observed_at_block));
        let bids = effective_block
            .and_then(|block| state.bids.get(&(collection_id, item_id, block)).cloned())
            .unwrap_or_default();

        let in_auction = match at_block {
            Some(block) => state
                .status
                .get(&(collection_id, item_id, block))
                .map(|row| row.in_auction),
            None => state
                .status
                .range(range)
                .next_back()
                .map(|(_, row)| row.in_auction),
        };

        Ok(AuctionData {
            auction,
            bids,
            in_auction,
        })
    }

    async fn active_auctions(&self) -> StorageResult<Vec<AuctionRow>> {
        let state = self.lock();
        let mut latest: BTreeMap<(u32, u32), AuctionRow> = BTreeMap::new();
        for row in state.auctions.values() {
            latest.insert((row.collection_id, row.item_id), row.clone());
        }
        Ok(latest.into_values().filter(|row| !row.ended).collect())
    }
}

#[async_trait]
impl SettingsStore for MemStores {
    async fn upsert_setting(&self, row: &SettingRow) -> StorageResult<()> {
        self.lock()
            .settings
            .insert(row.setting_name.clone(), row.clone());
        Ok(())
    }

    async fn get_setting(&self, name: &str) -> StorageResult<Option<SettingRow>> {
        Ok(self.lock().settings.get(name).cloned())
    }
}

#[async_trait]
impl Stores for MemStores {
    fn blocks(&self) -> &dyn BlockStore {
        self
    }

    fn auctions(&self) -> &dyn AuctionStore {
        self
    }

    fn settings(&self) -> &dyn SettingsStore {
        self
    }

    async fn project_block_atomic(&self, projection: &BlockProjection) -> StorageResult<()> {
        if let Some(delay) = self.projection_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();

        for auction in &projection.auctions {
            state.auctions.insert(
                (
                    auction.collection_id,
                    auction.item_id,
                    auction.observed_at_block,
                ),
                auction.clone(),
            );
        }

        // Same replace discipline as the SQL adapter: delete every key
        // observed in this projection, then reinsert.
        let mut keys: BTreeSet<(u32, u32)> = projection
            .bids
            .iter()
            .map(|b| (b.collection_id, b.item_id))
            .collect();
        keys.extend(
            projection
                .auctions
                .iter()
                .map(|a| (a.collection_id, a.item_id)),
        );
        for (collection_id, item_id) in keys {
            state
                .bids
                .remove(&(collection_id, item_id, projection.block_number));
        }
        for bid in &projection.bids {
            state
                .bids
                .entry((bid.collection_id, bid.item_id, bid.observed_at_block))
                .or_default()
                .push(bid.clone());
        }

        for status in &projection.status_flags {
            state.status.insert(
                (
                    status.collection_id,
                    status.item_id,
                    status.observed_at_block,
                ),
                status.clone(),
            );
        }

        for setting in &projection.settings {
            state
                .settings
                .insert(setting.setting_name.clone(), setting.clone());
        }

        state.projected_order.push(projection.block_number);
        Ok(())
    }
}

// =============================================================================
// Scripted chain mocks
// =============================================================================

type SnapshotMap = Arc<Mutex<HashMap<BlockHash, ChainResult<StorageSnapshot>>>>;

struct MockSource {
    heads: Mutex<Option<HeadStream>>,
    snapshots: SnapshotMap,
}

#[async_trait]
impl ChainSource for MockSource {
    async fn genesis_hash(&self) -> ChainResult<BlockHash> {
        Ok(BlockHash([0u8; 32]))
    }

    async fn subscribe_heads(&self) -> ChainResult<HeadStream> {
        self.heads
            .lock()
            .expect("heads lock poisoned")
            .take()
            .ok_or_else(|| ChainError::SubscriptionDropped("already subscribed".into()))
    }

    async fn snapshot_at(&self, hash: &BlockHash) -> ChainResult<StorageSnapshot> {
        let snapshots = self.snapshots.lock().expect("snapshot lock poisoned");
        match snapshots.get(hash) {
            Some(Ok(snapshot)) => Ok(snapshot.clone()),
            Some(Err(_)) => Err(ChainError::StorageQuery {
                block: hash.to_hex(),
                message: "scripted failure".into(),
            }),
            None => Err(ChainError::StorageQuery {
                block: hash.to_hex(),
                message: "no snapshot scripted".into(),
            }),
        }
    }
}

/// Connector whose sessions are scripted ahead of time. Each successful
/// session is fed headers through a channel the test holds; dropping the
/// sender simulates a transport drop.
struct ScriptedConnector {
    sessions: Mutex<VecDeque<Option<Arc<MockSource>>>>,
    connects: AtomicU32,
}

impl ScriptedConnector {
    fn new() -> Self {
        Self {
            sessions: Mutex::new(VecDeque::new()),
            connects: AtomicU32::new(0),
        }
    }

    fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Script a failing connect attempt.
    fn push_failure(&self) {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .push_back(None);
    }

    /// Script a successful session; returns the header feed.
    fn push_session(&self, snapshots: SnapshotMap) -> UnboundedSender<ChainResult<Header>> {
        let (tx, rx) = unbounded();
        let source = Arc::new(MockSource {
            heads: Mutex::new(Some(Box::pin(rx) as HeadStream)),
            snapshots,
        });
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .push_back(Some(source));
        tx
    }
}

#[async_trait]
impl ChainConnector for ScriptedConnector {
    async fn connect(&self) -> ChainResult<Box<dyn ChainSource>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self
            .sessions
            .lock()
            .expect("session lock poisoned")
            .pop_front();
        match next {
            Some(Some(source)) => Ok(Box::new(SharedSource(source))),
            _ => Err(ChainError::ConnectionFailed("scripted refusal".into())),
        }
    }
}

/// Box-able wrapper so the test keeps its own Arc to the source.
struct SharedSource(Arc<MockSource>);

#[async_trait]
impl ChainSource for SharedSource {
    async fn genesis_hash(&self) -> ChainResult<BlockHash> {
        self.0.genesis_hash().await
    }

    async fn subscribe_heads(&self) -> ChainResult<HeadStream> {
        self.0.subscribe_heads().await
    }

    async fn snapshot_at(&self, hash: &BlockHash) -> ChainResult<StorageSnapshot> {
        self.0.snapshot_at(hash).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn header(number: u64) -> Header {
    let mut hash = [0u8; 32];
    hash[..8].copy_from_slice(&number.to_be_bytes());
    hash[31] = 0x01;
    let mut parent = [0u8; 32];
    parent[..8].copy_from_slice(&number.saturating_sub(1).to_be_bytes());
    parent[31] = 0x01;
    Header {
        number,
        hash: BlockHash(hash),
        parent_hash: BlockHash(parent),
        extrinsics_count: 0,
    }
}

fn auction_snapshot(owner: &str, highest_bid: u128, ended: bool) -> StorageSnapshot {
    StorageSnapshot {
        auctions: vec![AuctionState {
            collection_id: 1,
            item_id: 1,
            owner: owner.to_string(),
            start_block: 5,
            highest_bid,
            highest_bidder: None,
            ended,
        }],
        bids: Vec::new(),
        status_flags: vec![StatusFlag {
            collection_id: 1,
            item_id: 1,
            in_auction: !ended,
        }],
        fee_percentage: 5,
        accumulated_fees: 0,
    }
}

fn snapshots(entries: Vec<(Header, StorageSnapshot)>) -> SnapshotMap {
    Arc::new(Mutex::new(
        entries
            .into_iter()
            .map(|(h, s)| (h.hash, Ok(s)))
            .collect(),
    ))
}

fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(8),
        max_reconnect_attempts: 5,
        queue_capacity: 16,
    }
}

fn spawn_pipeline(
    connector: Arc<ScriptedConnector>,
    stores: Arc<MemStores>,
    policy: Arc<dyn FailurePolicy>,
    config: SupervisorConfig,
) -> (
    tokio::task::JoinHandle<Result<(), IndexerError>>,
    watch::Sender<bool>,
) {
    let indexer = Arc::new(BlockIndexer::new(stores, policy));
    let supervisor = Arc::new(ConnectionSupervisor::new(connector, indexer, config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { supervisor.run(shutdown_rx).await });
    (handle, shutdown_tx)
}

/// Poll until `pred` holds or the deadline passes.
async fn wait_until<F: Fn() -> bool>(pred: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !pred() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn shutdown(
    handle: tokio::task::JoinHandle<Result<(), IndexerError>>,
    shutdown_tx: watch::Sender<bool>,
) {
    shutdown_tx.send(true).expect("supervisor gone");
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("supervisor did not stop")
        .expect("supervisor panicked");
    assert!(result.is_ok(), "clean shutdown expected: {:?}", result.err());
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn blocks_are_mirrored_in_arrival_order_without_duplicates() {
    let stores = MemStores::new();
    let connector = Arc::new(ScriptedConnector::new());

    let h1 = header(1);
    let h2 = header(2);
    let map = snapshots(vec![
        (h1.clone(), StorageSnapshot::default()),
        (h2.clone(), StorageSnapshot::default()),
    ]);
    let feed = connector.push_session(map);

    let (handle, shutdown_tx) = spawn_pipeline(
        connector,
        stores.clone(),
        Arc::new(BestEffort),
        fast_config(),
    );

    feed.unbounded_send(Ok(h1.clone())).unwrap();
    feed.unbounded_send(Ok(h2.clone())).unwrap();
    // Re-deliver header 1: the block row must stay untouched, the
    // projection is simply applied again.
    feed.unbounded_send(Ok(h1.clone())).unwrap();

    wait_until(|| stores.projected_order().len() == 3, "three projections").await;

    assert_eq!(stores.block_count(), 2);
    assert_eq!(stores.projected_order(), vec![1, 2, 1]);
    let stored = stores.blocks().get_block(1).await.unwrap().unwrap();
    assert_eq!(stored.hash, h1.hash);

    shutdown(handle, shutdown_tx).await;
}

#[tokio::test]
async fn reindexing_a_block_is_idempotent_and_replaces_bids() {
    let stores = MemStores::new();
    let connector = Arc::new(ScriptedConnector::new());

    let h100 = header(100);
    let first = StorageSnapshot {
        auctions: vec![AuctionState {
            collection_id: 1,
            item_id: 7,
            owner: "owner".into(),
            start_block: 5,
            highest_bid: 60,
            highest_bidder: Some("B".into()),
            ended: false,
        }],
        bids: vec![BidList {
            collection_id: 1,
            item_id: 7,
            bids: vec![
                BidEntry { bidder: "A".into(), amount: 50 },
                BidEntry { bidder: "B".into(), amount: 60 },
            ],
        }],
        status_flags: Vec::new(),
        fee_percentage: 5,
        accumulated_fees: 0,
    };
    let map = snapshots(vec![(h100.clone(), first.clone())]);
    let feed = connector.push_session(map.clone());

    let (handle, shutdown_tx) = spawn_pipeline(
        connector,
        stores.clone(),
        Arc::new(BestEffort),
        fast_config(),
    );

    feed.unbounded_send(Ok(h100.clone())).unwrap();
    wait_until(|| stores.projected_order().len() == 1, "first projection").await;

    let data = stores.auction_data_at(1, 7, None).await.unwrap();
    assert_eq!(data.bids.len(), 2);

    // The chain now shows a different bid list at the same block; the
    // re-index must leave exactly the new set, not a union.
    let mut second = first;
    second.bids = vec![BidList {
        collection_id: 1,
        item_id: 7,
        bids: vec![BidEntry { bidder: "B".into(), amount: 70 }],
    }];
    map.lock()
        .unwrap()
        .insert(h100.hash.clone(), Ok(second));

    feed.unbounded_send(Ok(h100.clone())).unwrap();
    wait_until(|| stores.projected_order().len() == 2, "second projection").await;

    let data = stores.auction_data_at(1, 7, None).await.unwrap();
    assert_eq!(data.bids.len(), 1);
    assert_eq!(data.bids[0].bidder_account, "B");
    assert_eq!(data.bids[0].amount, 70);
    assert_eq!(data.bids[0].observed_at_block, 100);

    // Auction row updated in place, never duplicated.
    let state_auctions: Vec<_> = {
        let guard = stores.lock();
        guard.auctions.keys().cloned().collect()
    };
    assert_eq!(state_auctions, vec![(1, 7, 100)]);

    shutdown(handle, shutdown_tx).await;
}

#[tokio::test]
async fn settings_reflect_the_most_recently_observed_block() {
    let stores = MemStores::new();
    let connector = Arc::new(ScriptedConnector::new());

    let h100 = header(100);
    let h101 = header(101);
    let mut snap_100 = StorageSnapshot::default();
    snap_100.fee_percentage = 5;
    let mut snap_101 = StorageSnapshot::default();
    snap_101.fee_percentage = 6;

    let map = snapshots(vec![(h100.clone(), snap_100), (h101.clone(), snap_101)]);
    let feed = connector.push_session(map);

    let (handle, shutdown_tx) = spawn_pipeline(
        connector,
        stores.clone(),
        Arc::new(BestEffort),
        fast_config(),
    );

    feed.unbounded_send(Ok(h100)).unwrap();
    feed.unbounded_send(Ok(h101)).unwrap();
    wait_until(|| stores.projected_order().len() == 2, "two projections").await;

    let fee = stores
        .get_setting(SETTING_FEE_PERCENTAGE)
        .await
        .unwrap()
        .expect("fee setting present");
    assert_eq!(fee.setting_value, "6");
    assert_eq!(fee.observed_at_block, 101);

    // Single row per setting name.
    assert_eq!(stores.lock().settings.len(), 2);

    shutdown(handle, shutdown_tx).await;
}

#[tokio::test]
async fn headers_are_processed_serially_in_arrival_order() {
    // Slow projections: if anything processed headers concurrently or
    // out of order, the recorded order would interleave.
    let stores = MemStores::with_projection_delay(Duration::from_millis(20));
    let connector = Arc::new(ScriptedConnector::new());

    let heads: Vec<Header> = (1..=5).map(header).collect();
    let map = snapshots(
        heads
            .iter()
            .map(|h| (h.clone(), StorageSnapshot::default()))
            .collect(),
    );
    let feed = connector.push_session(map);

    let (handle, shutdown_tx) = spawn_pipeline(
        connector,
        stores.clone(),
        Arc::new(BestEffort),
        fast_config(),
    );

    for h in &heads {
        feed.unbounded_send(Ok(h.clone())).unwrap();
    }
    wait_until(|| stores.projected_order().len() == 5, "five projections").await;

    assert_eq!(stores.projected_order(), vec![1, 2, 3, 4, 5]);

    shutdown(handle, shutdown_tx).await;
}

#[tokio::test]
async fn transport_drop_reconnects_and_rearms_the_subscription() {
    let stores = MemStores::new();
    let connector = Arc::new(ScriptedConnector::new());

    let h1 = header(1);
    let h2 = header(2);
    let map = snapshots(vec![
        (h1.clone(), StorageSnapshot::default()),
        (h2.clone(), StorageSnapshot::default()),
    ]);
    let feed_one = connector.push_session(map.clone());
    // The first reconnect attempt is refused; the second succeeds.
    connector.push_failure();
    let feed_two = connector.push_session(map);

    let (handle, shutdown_tx) = spawn_pipeline(
        connector.clone(),
        stores.clone(),
        Arc::new(BestEffort),
        fast_config(),
    );

    feed_one.unbounded_send(Ok(h1)).unwrap();
    wait_until(|| stores.projected_order().len() == 1, "first projection").await;

    // Transport drop: the first session's feed closes.
    drop(feed_one);

    feed_two.unbounded_send(Ok(h2)).unwrap();
    wait_until(|| stores.projected_order().len() == 2, "post-reconnect projection").await;

    assert_eq!(connector.connect_count(), 3);
    assert_eq!(stores.projected_order(), vec![1, 2]);

    shutdown(handle, shutdown_tx).await;
}

#[tokio::test]
async fn reconnect_budget_exhaustion_is_fatal() {
    let stores = MemStores::new();
    let connector = Arc::new(ScriptedConnector::new());
    // No sessions scripted: every connect attempt is refused.

    let (handle, _shutdown_tx) = spawn_pipeline(
        connector.clone(),
        stores.clone(),
        Arc::new(BestEffort),
        fast_config(),
    );

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("supervisor did not terminate")
        .expect("supervisor panicked");

    match result {
        Err(IndexerError::ReconnectExhausted { attempts }) => assert_eq!(attempts, 5),
        other => panic!("expected ReconnectExhausted, got {:?}", other),
    }
    // Initial connect plus five retries; no sixth retry.
    assert_eq!(connector.connect_count(), 6);
    assert_eq!(stores.block_count(), 0);
}

#[tokio::test]
async fn a_failing_block_is_skipped_and_the_pipeline_continues() {
    let stores = MemStores::new();
    let connector = Arc::new(ScriptedConnector::new());

    let h1 = header(1);
    let h2 = header(2);
    let h3 = header(3);
    let map = snapshots(vec![
        (h1.clone(), StorageSnapshot::default()),
        (h3.clone(), StorageSnapshot::default()),
    ]);
    // Block 2's extraction is scripted to fail persistently.
    map.lock().unwrap().insert(
        h2.hash.clone(),
        Err(ChainError::StorageQuery {
            block: h2.hash.to_hex(),
            message: "scripted failure".into(),
        }),
    );
    let feed = connector.push_session(map);

    let (handle, shutdown_tx) = spawn_pipeline(
        connector,
        stores.clone(),
        Arc::new(BestEffort),
        fast_config(),
    );

    feed.unbounded_send(Ok(h1)).unwrap();
    feed.unbounded_send(Ok(h2)).unwrap();
    feed.unbounded_send(Ok(h3)).unwrap();

    wait_until(|| stores.projected_order() == vec![1, 3], "blocks 1 and 3").await;

    // The block row was written before extraction failed; the
    // projection gap for block 2 is the documented best-effort risk.
    assert_eq!(stores.block_count(), 3);
    let fee = stores
        .get_setting(SETTING_FEE_PERCENTAGE)
        .await
        .unwrap()
        .expect("fee setting present");
    assert_eq!(fee.observed_at_block, 3);

    shutdown(handle, shutdown_tx).await;
}

#[tokio::test]
async fn bounded_retry_dead_letters_a_persistently_failing_block() {
    let stores = MemStores::new();
    let connector = Arc::new(ScriptedConnector::new());

    let h1 = header(1);
    let h2 = header(2);
    let map = snapshots(vec![(h2.clone(), StorageSnapshot::default())]);
    map.lock().unwrap().insert(
        h1.hash.clone(),
        Err(ChainError::StorageQuery {
            block: h1.hash.to_hex(),
            message: "scripted failure".into(),
        }),
    );
    let feed = connector.push_session(map);

    let policy = Arc::new(BoundedRetry::new(3));
    let (handle, shutdown_tx) = spawn_pipeline(
        connector,
        stores.clone(),
        policy.clone(),
        fast_config(),
    );

    feed.unbounded_send(Ok(h1)).unwrap();
    feed.unbounded_send(Ok(h2)).unwrap();

    wait_until(|| stores.projected_order() == vec![2], "block 2 after retries").await;
    assert_eq!(policy.dead_letters(), vec![1]);

    shutdown(handle, shutdown_tx).await;
}

#[tokio::test]
async fn end_to_end_auction_lookup() {
    let stores = MemStores::new();
    let connector = Arc::new(ScriptedConnector::new());

    let h10 = header(10);
    let snapshot = StorageSnapshot {
        auctions: vec![AuctionState {
            collection_id: 1,
            item_id: 1,
            owner: "X".into(),
            start_block: 5,
            highest_bid: 0,
            highest_bidder: None,
            ended: false,
        }],
        bids: Vec::new(),
        status_flags: vec![StatusFlag {
            collection_id: 1,
            item_id: 1,
            in_auction: true,
        }],
        fee_percentage: 5,
        accumulated_fees: 0,
    };
    let map = snapshots(vec![(h10.clone(), snapshot)]);
    let feed = connector.push_session(map);

    let (handle, shutdown_tx) = spawn_pipeline(
        connector,
        stores.clone(),
        Arc::new(BestEffort),
        fast_config(),
    );

    feed.unbounded_send(Ok(h10.clone())).unwrap();
    wait_until(|| stores.projected_order().len() == 1, "projection").await;

    let data = stores.auction_data_at(1, 1, None).await.unwrap();
    let auction = data.auction.expect("auction mirrored");
    assert_eq!(auction.owner_account, "X");
    assert_eq!(auction.start_block, 5);
    assert_eq!(auction.highest_bid, 0);
    assert_eq!(auction.highest_bidder, None);
    assert!(!auction.ended);
    assert_eq!(auction.observed_at_block, 10);
    assert!(data.bids.is_empty());
    assert_eq!(data.in_auction, Some(true));

    // Historical lookup through the mirrored hash resolves to the same
    // observation; an unknown hash yields an empty result.
    let pinned = stores.auction_data_at(1, 1, Some(&h10.hash)).await.unwrap();
    assert!(pinned.auction.is_some());
    let unknown = stores
        .auction_data_at(1, 1, Some(&BlockHash([0x99; 32])))
        .await
        .unwrap();
    assert!(unknown.auction.is_none());
    assert_eq!(unknown.in_auction, None);

    // A key with no mirrored status is distinct from an explicit false.
    let missing = stores.auction_data_at(2, 2, None).await.unwrap();
    assert!(missing.auction.is_none());
    assert_eq!(missing.in_auction, None);

    shutdown(handle, shutdown_tx).await;
}

#[tokio::test]
async fn active_auctions_excludes_ended_ones() {
    let stores = MemStores::new();
    let connector = Arc::new(ScriptedConnector::new());

    let h20 = header(20);
    let h21 = header(21);
    // Block 20: auction open. Block 21: same auction now ended.
    let map = snapshots(vec![
        (h20.clone(), auction_snapshot("X", 50, false)),
        (h21.clone(), auction_snapshot("X", 70, true)),
    ]);
    let feed = connector.push_session(map);

    let (handle, shutdown_tx) = spawn_pipeline(
        connector,
        stores.clone(),
        Arc::new(BestEffort),
        fast_config(),
    );

    feed.unbounded_send(Ok(h20)).unwrap();
    wait_until(|| stores.projected_order().len() == 1, "first projection").await;
    let active = stores.auctions().active_auctions().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].highest_bid, 50);

    feed.unbounded_send(Ok(h21)).unwrap();
    wait_until(|| stores.projected_order().len() == 2, "second projection").await;
    let active = stores.auctions().active_auctions().await.unwrap();
    assert!(active.is_empty());

    shutdown(handle, shutdown_tx).await;
}
