// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the sync queue.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `sync_queue_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: create, update, delete, list, probe
//! - `status`: success, error, skipped

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record the outcome of one remote call
pub fn record_remote_operation(operation: &str, status: &str) {
    counter!(
        "sync_queue_remote_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record remote call latency
pub fn record_remote_latency(operation: &str, duration: Duration) {
    histogram!(
        "sync_queue_remote_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a finished pass and how long it took
pub fn record_pass(status: &str, duration: Duration) {
    counter!("sync_queue_passes_total", "status" => status.to_string()).increment(1);
    histogram!("sync_queue_pass_seconds").record(duration.as_secs_f64());
}

/// A pass refused because another one was in flight
pub fn record_pass_skipped() {
    counter!("sync_queue_passes_skipped_total").increment(1);
}

/// Records that needed no remote call (never-synced tombstones)
pub fn record_dropped_tombstones(count: usize) {
    counter!("sync_queue_dropped_tombstones_total").increment(count as u64);
}

/// Outcome of one partition listing refresh
pub fn record_refresh(success: bool, merged: usize) {
    let status = if success { "success" } else { "error" };
    counter!("sync_queue_refreshes_total", "status" => status).increment(1);
    if success {
        histogram!("sync_queue_refresh_merged").record(merged as f64);
    }
}

/// Set the number of records waiting for a pass
pub fn set_dirty_records(count: u64) {
    gauge!("sync_queue_dirty_records").set(count as f64);
}

/// Set scheduler state (0 = Idle, 1 = Running, 2 = Paused, 3 = Stopped)
pub fn set_scheduler_state(state: u8) {
    gauge!("sync_queue_scheduler_state").set(state as f64);
}

/// Set remote reachability (1 = reachable)
pub fn set_remote_reachable(reachable: bool) {
    gauge!("sync_queue_remote_reachable").set(if reachable { 1.0 } else { 0.0 });
}

/// A timing guard that records remote latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_remote_latency(self.operation, self.start.elapsed());
    }
}
