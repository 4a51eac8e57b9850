//! Substrate RPC client implementing the chain ports.

use async_trait::async_trait;
use futures::StreamExt;
use subxt::{OnlineClient, PolkadotConfig};
use tracing::{debug, warn};

use gavel_core::error::{ChainError, ChainResult};
use gavel_core::models::{BlockHash, Header, StorageSnapshot};
use gavel_core::ports::{ChainConnector, ChainSource, HeadMode, HeadStream};

use crate::extract;

/// Configuration for the Substrate connection.
#[derive(Debug, Clone)]
pub struct SubstrateConfig {
    /// WebSocket URL (e.g., "ws://localhost:9944").
    pub ws_url: String,
    /// Which chain head the subscription follows.
    pub head_mode: HeadMode,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:9944".to_string(),
            head_mode: HeadMode::default(),
        }
    }
}

/// Connection factory. The supervisor calls [`ChainConnector::connect`]
/// on startup and after every transport drop; each call builds a fresh
/// client with freshly fetched metadata.
pub struct SubstrateConnector {
    config: SubstrateConfig,
}

impl SubstrateConnector {
    pub fn new(config: SubstrateConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ChainConnector for SubstrateConnector {
    async fn connect(&self) -> ChainResult<Box<dyn ChainSource>> {
        debug!(url = %self.config.ws_url, "connecting to node");

        let client = OnlineClient::<PolkadotConfig>::from_url(&self.config.ws_url)
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;

        debug!("connected");
        Ok(Box::new(SubstrateSource {
            client,
            head_mode: self.config.head_mode,
        }))
    }
}

/// One live connection implementing the [`ChainSource`] port.
pub struct SubstrateSource {
    client: OnlineClient<PolkadotConfig>,
    head_mode: HeadMode,
}

#[async_trait]
impl ChainSource for SubstrateSource {
    async fn genesis_hash(&self) -> ChainResult<BlockHash> {
        Ok(BlockHash(self.client.genesis_hash().0))
    }

    async fn subscribe_heads(&self) -> ChainResult<HeadStream> {
        let subscription = match self.head_mode {
            HeadMode::Best => self.client.blocks().subscribe_best().await,
            HeadMode::Finalized => self.client.blocks().subscribe_finalized().await,
        }
        .map_err(|e| ChainError::SubscriptionDropped(e.to_string()))?;

        let stream = subscription.then(|result| async move {
            match result {
                Ok(block) => {
                    // The extrinsics body is only needed for the count;
                    // failing to fetch it is not worth dropping the block.
                    let extrinsics_count = match block.extrinsics().await {
                        Ok(extrinsics) => extrinsics.len() as u32,
                        Err(e) => {
                            warn!(
                                block = u64::from(block.number()),
                                error = %e,
                                "failed to fetch extrinsics, counting 0"
                            );
                            0
                        }
                    };

                    Ok(Header {
                        number: u64::from(block.number()),
                        hash: BlockHash(block.hash().0),
                        parent_hash: BlockHash(block.header().parent_hash.0),
                        extrinsics_count,
                    })
                }
                Err(e) => Err(ChainError::SubscriptionDropped(e.to_string())),
            }
        });

        Ok(Box::pin(stream))
    }

    async fn snapshot_at(&self, hash: &BlockHash) -> ChainResult<StorageSnapshot> {
        extract::snapshot_at(&self.client, hash).await
    }
}
