//! Connection supervisor - owns the chain connection lifecycle.
//!
//! # Design
//!
//! The supervisor is the only place connection state is mutated. It
//! connects, subscribes to new heads, and forwards each header into a
//! bounded queue consumed by exactly one worker task, so headers are
//! projected in arrival order by construction.
//!
//! On a transport drop it tears the subscription down, backs off
//! exponentially and reconnects; the attempt counter resets on every
//! successful connect. Exhausting the attempt budget is fatal by policy:
//! the operator intervenes rather than the pipeline looping forever.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::{IndexerError, IndexerResult};
use crate::metrics::{record_reconnect, record_transport_drop};
use crate::models::Header;
use crate::ports::{ChainConnector, ChainSource};
use crate::services::indexer::BlockIndexer;

/// Configuration for the connection supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Base reconnect delay.
    pub base_delay: Duration,
    /// Reconnect delay ceiling.
    pub max_delay: Duration,
    /// Reconnect attempts before giving up for good.
    pub max_reconnect_attempts: u32,
    /// Capacity of the header work queue. A full queue applies
    /// backpressure to the subscription instead of dropping headers.
    pub queue_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            queue_capacity: 64,
        }
    }
}

/// Reconnect delay for the given 1-based attempt: double per attempt,
/// capped at the configured ceiling.
fn backoff_delay(config: &SupervisorConfig, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    config.base_delay.saturating_mul(factor).min(config.max_delay)
}

/// One unit of work for the queue worker.
///
/// Carries the originating connection so extraction after a reconnect
/// still targets the connection that delivered the header.
struct IndexTask {
    source: Arc<dyn ChainSource>,
    header: Header,
}

/// Outcome of one subscription session.
enum Session {
    /// Shutdown was requested; stop supervising.
    Shutdown,
    /// The transport dropped; reconnect.
    Dropped,
}

/// Owns the chain connection and drives the indexing pipeline.
pub struct ConnectionSupervisor {
    connector: Arc<dyn ChainConnector>,
    indexer: Arc<BlockIndexer>,
    config: SupervisorConfig,
}

impl ConnectionSupervisor {
    pub fn new(
        connector: Arc<dyn ChainConnector>,
        indexer: Arc<BlockIndexer>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            connector,
            indexer,
            config,
        }
    }

    /// Run until shutdown is signalled or the reconnect budget is
    /// exhausted.
    ///
    /// On shutdown, pending queued work is drained naturally: the queue
    /// sender is dropped and the worker finishes what it has before
    /// exiting.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> IndexerResult<()> {
        let (task_tx, task_rx) = mpsc::channel::<IndexTask>(self.config.queue_capacity);

        let indexer = self.indexer.clone();
        let worker = tokio::spawn(async move {
            let mut task_rx = task_rx;
            while let Some(task) = task_rx.recv().await {
                indexer.index(task.source.as_ref(), &task.header).await;
            }
            debug!("header worker drained");
        });

        let result = self.supervise(task_tx, &mut shutdown_rx).await;

        // task_tx was consumed by supervise(); once it is gone the worker
        // sees the channel close and exits after the in-flight block.
        match tokio::time::timeout(Duration::from_secs(30), worker).await {
            Ok(_) => debug!("worker stopped"),
            Err(_) => warn!("worker drain timed out"),
        }

        result
    }

    async fn supervise(
        &self,
        task_tx: mpsc::Sender<IndexTask>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> IndexerResult<()> {
        let mut attempts: u32 = 0;

        loop {
            if *shutdown_rx.borrow() {
                info!("shutdown requested, supervisor stopping");
                return Ok(());
            }

            match self.connector.connect().await {
                Ok(source) => {
                    attempts = 0;
                    let source: Arc<dyn ChainSource> = Arc::from(source);
                    match source.genesis_hash().await {
                        Ok(genesis) => info!(genesis = %genesis, "chain connected"),
                        Err(e) => warn!(error = %e, "chain connected, genesis query failed"),
                    }
                    match self.pump_heads(source, &task_tx, shutdown_rx).await {
                        Session::Shutdown => {
                            info!("shutdown requested, supervisor stopping");
                            return Ok(());
                        }
                        Session::Dropped => {
                            record_transport_drop();
                            warn!("chain connection lost");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "chain connection failed");
                }
            }

            attempts += 1;
            if attempts > self.config.max_reconnect_attempts {
                error!(
                    attempts = attempts - 1,
                    "reconnect budget exhausted, terminating"
                );
                return Err(IndexerError::ReconnectExhausted {
                    attempts: attempts - 1,
                });
            }

            let delay = backoff_delay(&self.config, attempts);
            record_reconnect(attempts);
            info!(
                attempt = attempts,
                max_attempts = self.config.max_reconnect_attempts,
                delay_ms = delay.as_millis() as u64,
                "backing off before reconnect"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("shutdown requested during backoff");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Pump one subscription session's headers into the work queue.
    ///
    /// Returning drops the head stream, which cancels the subscription -
    /// the old handle is therefore always gone before a replacement
    /// subscription is created.
    async fn pump_heads(
        &self,
        source: Arc<dyn ChainSource>,
        task_tx: &mpsc::Sender<IndexTask>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Session {
        let mut heads = match source.subscribe_heads().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "head subscription failed");
                return Session::Dropped;
            }
        };
        debug!("head subscription established");

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        return Session::Shutdown;
                    }
                }
                next = heads.next() => match next {
                    Some(Ok(header)) => {
                        debug!(block = header.number, "header received");
                        let task = IndexTask {
                            source: source.clone(),
                            header,
                        };
                        if task_tx.send(task).await.is_err() {
                            return Session::Shutdown;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "head subscription error");
                        return Session::Dropped;
                    }
                    None => {
                        debug!("head subscription ended");
                        return Session::Dropped;
                    }
                }
            }
        }
    }
}
