//! Per-block failure policy.
//!
//! What happens when one block's extraction or projection fails is a
//! deliberate policy choice, isolated here so a stricter mode can be
//! substituted without touching the pipeline structure.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::IndexerError;

/// Decision after a failed indexing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Abandon the block permanently and continue with the next header.
    Skip,
    /// Retry the same block in place.
    Retry,
}

/// Policy consulted by the indexer after each failed attempt.
///
/// `attempt` is 1-based and counts attempts for the current block only.
#[async_trait]
pub trait FailurePolicy: Send + Sync {
    async fn on_failure(
        &self,
        block_number: u64,
        attempt: u32,
        error: &IndexerError,
    ) -> FailureAction;
}

/// Default policy: log-and-skip, favoring liveness over completeness.
///
/// A transient failure leaves a permanent gap in the mirrored history
/// for that block unless a separate backfill mechanism fills it.
#[derive(Debug, Default)]
pub struct BestEffort;

#[async_trait]
impl FailurePolicy for BestEffort {
    async fn on_failure(&self, _block_number: u64, _attempt: u32, _error: &IndexerError) -> FailureAction {
        FailureAction::Skip
    }
}

/// Stricter policy: retry a bounded number of times in place, then give
/// the block up and record its number in a dead-letter list an external
/// backfill can consume.
#[derive(Debug)]
pub struct BoundedRetry {
    max_attempts: u32,
    dead_letters: Mutex<Vec<u64>>,
}

impl BoundedRetry {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            dead_letters: Mutex::new(Vec::new()),
        }
    }

    /// Block numbers abandoned after exhausting their retry budget.
    pub fn dead_letters(&self) -> Vec<u64> {
        self.dead_letters.lock().expect("dead letter lock poisoned").clone()
    }
}

#[async_trait]
impl FailurePolicy for BoundedRetry {
    async fn on_failure(&self, block_number: u64, attempt: u32, _error: &IndexerError) -> FailureAction {
        if attempt < self.max_attempts {
            FailureAction::Retry
        } else {
            self.dead_letters
                .lock()
                .expect("dead letter lock poisoned")
                .push(block_number);
            FailureAction::Skip
        }
    }
}
