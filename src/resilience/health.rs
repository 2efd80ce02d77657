// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote connectivity tracking.
//!
//! Every sync pass starts with a probe. The monitor remembers the outcome,
//! counts consecutive failures, and logs when the remote goes away or comes
//! back so the log is not flooded with one warning per pass.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::remote::{RemoteError, RemoteService};

/// Consecutive failures before the remote is reported unreachable.
pub const DEFAULT_FAILURE_THRESHOLD: u64 = 3;

pub struct ConnectivityMonitor {
    /// Last known reachability
    reachable: AtomicBool,
    /// Consecutive failure count
    failures: AtomicU64,
    failure_threshold: u64,
    /// Serializes probes
    checking: Mutex<()>,
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_FAILURE_THRESHOLD)
    }

    pub fn with_threshold(failure_threshold: u64) -> Self {
        Self {
            reachable: AtomicBool::new(true), // optimistic until a probe fails
            failures: AtomicU64::new(0),
            failure_threshold: failure_threshold.max(1),
            checking: Mutex::new(()),
        }
    }

    pub fn record_success(&self) {
        let previous = self.failures.swap(0, Ordering::AcqRel);
        if !self.reachable.swap(true, Ordering::AcqRel) {
            info!(failed_probes = previous, "Remote reachable again");
        }
    }

    pub fn record_failure(&self, error: &RemoteError) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.failure_threshold && self.reachable.swap(false, Ordering::AcqRel) {
            warn!(failures, error = %error, "Remote unreachable, passes will keep records dirty");
        }
    }

    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    /// Probe the remote and record the outcome.
    pub async fn check(&self, remote: &dyn RemoteService) -> Result<(), RemoteError> {
        let _guard = self.checking.lock().await;

        match remote.probe().await {
            Ok(()) => {
                self.record_success();
                Ok(())
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}
