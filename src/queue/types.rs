// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the sync queue.

use thiserror::Error;

use crate::reconciler::PassReport;
use crate::scheduler::SchedulerState;
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Snapshot of the queue for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueStatus {
    pub scheduler: SchedulerState,
    pub pending_create: u64,
    pub pending_update: u64,
    pub pending_delete: u64,
    pub clean: u64,
    /// A pass is running right now
    pub pass_in_flight: bool,
    /// Result of the last connectivity probe (optimistic before the first)
    pub remote_reachable: bool,
    pub passes_completed: u64,
    pub last_pass: Option<PassReport>,
}

impl QueueStatus {
    /// Records waiting for a remote operation.
    #[must_use]
    pub fn dirty(&self) -> u64 {
        self.pending_create + self.pending_update + self.pending_delete
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | {} dirty ({} create, {} update, {} delete), {} clean",
            self.scheduler,
            self.dirty(),
            self.pending_create,
            self.pending_update,
            self.pending_delete,
            self.clean
        )?;
        if !self.remote_reachable {
            write!(f, " | remote unreachable")?;
        }
        Ok(())
    }
}
