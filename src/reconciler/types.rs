// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for sync passes.

use std::time::Duration;

use crate::remote::{RemoteError, RemoteRecord};
use crate::sync_state::SyncState;

/// Remote operation issued for a dirty record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Create,
    Update,
    Delete,
}

impl OpKind {
    /// Operation matching a dirty state, `None` for [`SyncState::Clean`].
    #[must_use]
    pub fn for_state(state: SyncState) -> Option<Self> {
        match state {
            SyncState::PendingCreate => Some(Self::Create),
            SyncState::PendingUpdate => Some(Self::Update),
            SyncState::PendingDelete => Some(Self::Delete),
            SyncState::Clean => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful remote response, before it is applied to the store.
#[derive(Debug, Clone)]
pub(crate) enum OpResponse {
    Created(RemoteRecord),
    Updated(RemoteRecord),
    Deleted,
}

/// What applying a successful response did to the local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Applied {
    /// Remote id attached, record clean
    Created,
    /// Mirrored fields refreshed, record clean
    Updated,
    /// Record removed
    Deleted,
    /// Remote id attached but the record was edited while the create was in
    /// flight, so it stays dirty
    CreatedStillDirty,
    /// The record changed (or vanished) while the operation was in flight;
    /// left as it was
    Superseded,
}

/// Result of one completed sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Dirty records found at the start of the pass
    pub total: usize,
    /// Records whose operation succeeded (including dropped tombstones)
    pub succeeded: usize,
    /// Records left dirty because the remote or the store failed
    pub failed: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Tombstones of records that never reached the remote, removed locally
    pub dropped: usize,
    /// Successful responses for records edited in the meantime
    pub superseded: usize,
    /// Partitions whose remote listing was merged after the pass
    pub refreshed: Vec<String>,
    pub duration: Duration,
}

impl PassReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl std::fmt::Display for PassReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} synced (created={}, updated={}, deleted={}, dropped={}, failed={})",
            self.succeeded, self.total, self.created, self.updated, self.deleted, self.dropped, self.failed
        )
    }
}

/// How a call to [`run_sync_pass`](super::Reconciler::run_sync_pass) ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// The pass ran to completion
    Completed(PassReport),
    /// Another pass was already in flight; nothing was done
    Skipped,
    /// The connectivity probe failed; every record was left dirty
    Offline(RemoteError),
    /// The dirty set could not be read from the store
    StoreUnavailable(String),
}

impl PassOutcome {
    #[must_use]
    pub fn report(&self) -> Option<&PassReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

impl std::fmt::Display for PassOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed(report) => write!(f, "Completed({})", report),
            Self::Skipped => write!(f, "Skipped"),
            Self::Offline(e) => write!(f, "Offline({})", e),
            Self::StoreUnavailable(e) => write!(f, "StoreUnavailable({})", e),
        }
    }
}
