// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-record sync state machine.
//!
//! Every record in the store carries exactly one [`SyncState`]. The
//! transition functions here are pure so the rules can be checked without
//! a store:
//!
//! ```text
//!   (new) ──────────────► PendingCreate ──┐
//!                              │ edit      │ remote ok
//!                              ▼           ▼
//!   Clean ──── edit ────► PendingUpdate ─► Clean
//!     │                        │
//!     └──── delete ────► PendingDelete ◄── delete (from any state)
//!                              │ remote ok
//!                              ▼
//!                          (removed)
//! ```
//!
//! # Example
//!
//! ```
//! use offline_sync::SyncState;
//!
//! let state = SyncState::Clean.on_edit();
//! assert_eq!(state, SyncState::PendingUpdate);
//!
//! // Delete always wins, and further edits never undo it.
//! let state = state.on_delete();
//! assert_eq!(state.on_edit(), SyncState::PendingDelete);
//! ```

use serde::{Deserialize, Serialize};

/// Sync state of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Local copy matches the last confirmed remote state
    Clean,
    /// Never confirmed by the remote; needs a create
    PendingCreate,
    /// Exists remotely, local edits need an update
    PendingUpdate,
    /// Deletion requested; needs a remote delete (or a local drop if it never
    /// reached the remote)
    PendingDelete,
}

/// Outcome of applying a successful remote operation to a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// The record is now in the given state
    Keep(SyncState),
    /// The record should be removed from the store
    Remove,
}

impl SyncState {
    /// All four states, dirty states first.
    pub const ALL: [SyncState; 4] = [
        SyncState::PendingDelete,
        SyncState::PendingUpdate,
        SyncState::PendingCreate,
        SyncState::Clean,
    ];

    /// The three states that need a remote operation.
    pub const DIRTY: [SyncState; 3] = [
        SyncState::PendingDelete,
        SyncState::PendingUpdate,
        SyncState::PendingCreate,
    ];

    /// Initial state of a record saved locally for the first time.
    ///
    /// A record that already has a remote identifier (e.g. imported from a
    /// listing and re-saved) needs an update, not a create.
    #[must_use]
    pub fn for_new_record(has_remote_id: bool) -> Self {
        if has_remote_id {
            Self::PendingUpdate
        } else {
            Self::PendingCreate
        }
    }

    /// State after a local edit.
    #[must_use]
    pub fn on_edit(self) -> Self {
        match self {
            Self::Clean => Self::PendingUpdate,
            other => other,
        }
    }

    /// State after a local delete request. Idempotent; overrides any pending
    /// create or update.
    #[must_use]
    pub fn on_delete(self) -> Self {
        Self::PendingDelete
    }

    /// Result of the matching remote operation succeeding.
    #[must_use]
    pub fn on_remote_success(self) -> Settled {
        match self {
            Self::PendingDelete => Settled::Remove,
            _ => Settled::Keep(Self::Clean),
        }
    }

    /// Whether the record needs a remote operation.
    #[must_use]
    pub fn is_dirty(self) -> bool {
        !matches!(self, Self::Clean)
    }

    /// Sort rank used by listings: every dirty record before any clean one.
    #[must_use]
    pub fn rank(self) -> u8 {
        if self.is_dirty() {
            0
        } else {
            1
        }
    }

    /// Stable storage tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::PendingCreate => "pending_create",
            Self::PendingUpdate => "pending_update",
            Self::PendingDelete => "pending_delete",
        }
    }

    /// Parse a storage tag written by [`as_str`](Self::as_str).
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "clean" => Some(Self::Clean),
            "pending_create" => Some(Self::PendingCreate),
            "pending_update" => Some(Self::PendingUpdate),
            "pending_delete" => Some(Self::PendingDelete),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "Clean"),
            Self::PendingCreate => write!(f, "PendingCreate"),
            Self::PendingUpdate => write!(f, "PendingUpdate"),
            Self::PendingDelete => write!(f, "PendingDelete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_state() {
        assert_eq!(SyncState::for_new_record(false), SyncState::PendingCreate);
        assert_eq!(SyncState::for_new_record(true), SyncState::PendingUpdate);
    }

    #[test]
    fn test_edit_transitions() {
        assert_eq!(SyncState::Clean.on_edit(), SyncState::PendingUpdate);
        assert_eq!(SyncState::PendingCreate.on_edit(), SyncState::PendingCreate);
        assert_eq!(SyncState::PendingUpdate.on_edit(), SyncState::PendingUpdate);
        assert_eq!(SyncState::PendingDelete.on_edit(), SyncState::PendingDelete);
    }

    #[test]
    fn test_delete_wins_from_every_state() {
        for state in SyncState::ALL {
            assert_eq!(state.on_delete(), SyncState::PendingDelete);
            assert_eq!(state.on_delete().on_delete(), SyncState::PendingDelete);
        }
    }

    #[test]
    fn test_remote_success() {
        assert_eq!(SyncState::PendingCreate.on_remote_success(), Settled::Keep(SyncState::Clean));
        assert_eq!(SyncState::PendingUpdate.on_remote_success(), Settled::Keep(SyncState::Clean));
        assert_eq!(SyncState::PendingDelete.on_remote_success(), Settled::Remove);
    }

    #[test]
    fn test_dirty_ranks_before_clean() {
        for state in SyncState::DIRTY {
            assert!(state.is_dirty());
            assert!(state.rank() < SyncState::Clean.rank());
        }
        assert!(!SyncState::Clean.is_dirty());
    }

    #[test]
    fn test_tag_roundtrip_and_unknown() {
        for state in SyncState::ALL {
            assert_eq!(SyncState::parse(state.as_str()), Some(state));
        }
        assert_eq!(SyncState::parse("must_publish"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", SyncState::PendingDelete), "PendingDelete");
        assert_eq!(format!("{}", SyncState::Clean), "Clean");
    }
}
