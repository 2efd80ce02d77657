// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the sync queue.
//!
//! # Example
//!
//! ```
//! use offline_sync::SyncQueueConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SyncQueueConfig::default();
//! assert_eq!(config.sync_interval_ms, 20_000);
//! assert!(config.store_path.is_none()); // in-memory store
//!
//! // Durable store, faster schedule
//! let config = SyncQueueConfig {
//!     store_path: Some("posts.db".into()),
//!     sync_interval_ms: 5_000,
//!     ..Default::default()
//! };
//! assert_eq!(config.sync_interval().as_secs(), 5);
//! ```

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the sync queue.
///
/// All fields have defaults. Set `store_path` for records to survive a
/// restart.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncQueueConfig {
    /// Time between scheduled sync passes (default: 20 s)
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    /// SQLite file for the record store. `None` keeps records in memory.
    #[serde(default)]
    pub store_path: Option<String>,

    /// Remote operations allowed in flight within one pass
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Records read per store page while collecting the dirty set
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: usize,

    /// Merge the remote listing of every touched partition after a pass
    #[serde(default = "default_true")]
    pub refresh_after_pass: bool,

    /// Probe the remote before issuing any operation
    #[serde(default = "default_true")]
    pub probe_before_pass: bool,
}

fn default_sync_interval_ms() -> u64 { 20_000 }
fn default_max_in_flight() -> usize { 8 }
fn default_scan_page_size() -> usize { 100 }
fn default_true() -> bool { true }

impl Default for SyncQueueConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: default_sync_interval_ms(),
            store_path: None,
            max_in_flight: default_max_in_flight(),
            scan_page_size: default_scan_page_size(),
            refresh_after_pass: true,
            probe_before_pass: true,
        }
    }
}

impl SyncQueueConfig {
    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms.max(1))
    }

    /// Reject settings the queue cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.sync_interval_ms == 0 {
            return Err("sync_interval_ms must be greater than zero".into());
        }
        if self.max_in_flight == 0 {
            return Err("max_in_flight must be greater than zero".into());
        }
        if self.scan_page_size == 0 {
            return Err("scan_page_size must be greater than zero".into());
        }
        if matches!(&self.store_path, Some(p) if p.trim().is_empty()) {
            return Err("store_path must not be blank".into());
        }
        Ok(())
    }
}
