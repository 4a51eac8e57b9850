//! Metrics definitions for the mirror pipeline.
//!
//! Collected with the `metrics` crate; the binary installs a Prometheus
//! exporter when one is configured.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "blocks_mirrored_total",
        "Total number of blocks whose projection was applied"
    );
    describe_counter!(
        "blocks_abandoned_total",
        "Total number of blocks abandoned by the failure policy"
    );
    describe_counter!("reconnects_total", "Total number of reconnect attempts");
    describe_counter!(
        "transport_drops_total",
        "Total number of mid-session transport drops"
    );
    describe_histogram!(
        "block_projection_duration_seconds",
        "Time taken to extract and project one block in seconds"
    );
}

/// Record a successfully mirrored block.
pub fn record_block_mirrored() {
    counter!("blocks_mirrored_total").increment(1);
}

/// Record a block abandoned after its indexing failed.
pub fn record_block_abandoned() {
    counter!("blocks_abandoned_total").increment(1);
}

/// Record a reconnect attempt.
pub fn record_reconnect(attempt: u32) {
    counter!("reconnects_total", "attempt" => attempt.to_string()).increment(1);
}

/// Record a mid-session transport drop.
pub fn record_transport_drop() {
    counter!("transport_drops_total").increment(1);
}

/// Record extract+project duration for one block.
pub fn record_projection_duration(duration_secs: f64) {
    histogram!("block_projection_duration_seconds").record(duration_secs);
}

/// A timer that records the projection duration when dropped.
pub struct ProjectionTimer {
    start: Instant,
}

impl ProjectionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for ProjectionTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProjectionTimer {
    fn drop(&mut self) {
        record_projection_duration(self.start.elapsed().as_secs_f64());
    }
}
