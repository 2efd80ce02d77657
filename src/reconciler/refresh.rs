// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Merging a remote partition listing into the store.

use std::collections::HashSet;

use tracing::debug;

use crate::record::Record;
use crate::remote::RemoteRecord;
use crate::storage::{RecordStore, StoreError};
use crate::sync_state::SyncState;

/// Counts from one listing merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    /// Remote entries whose local copy is dirty and was left alone
    pub skipped_dirty: usize,
}

impl MergeStats {
    #[must_use]
    pub fn merged(&self) -> usize {
        self.inserted + self.updated + self.removed
    }
}

/// Make the clean records of `partition` mirror `listing`.
///
/// Dirty records are never touched: they carry local changes the remote has
/// not seen yet.
pub(crate) fn merge_listing(
    store: &dyn RecordStore,
    partition: &str,
    listing: &[RemoteRecord],
) -> Result<MergeStats, StoreError> {
    let mut stats = MergeStats::default();
    let listed: HashSet<&str> = listing.iter().map(|r| r.remote_id.as_str()).collect();

    let stale: Vec<String> = store
        .list_by_state(&[SyncState::Clean])
        .collect_records()?
        .into_iter()
        .filter(|s| s.record.partition == partition)
        .filter(|s| match &s.record.remote_id {
            Some(id) => !listed.contains(id.as_str()),
            None => false,
        })
        .map(|s| s.record.local_id)
        .collect();
    for local_id in stale {
        if store.remove(&local_id)? {
            stats.removed += 1;
        }
    }

    for entry in listing {
        match store.find_by_remote_id(&entry.remote_id)? {
            Some(existing) if existing.is_dirty() => stats.skipped_dirty += 1,
            Some(existing) => {
                let mut record = existing.record;
                let before = record.clone();
                record.replace_from_remote(entry);
                if record != before {
                    record.updated_at = entry.updated_at;
                    store.put(&record, SyncState::Clean)?;
                    stats.updated += 1;
                }
            }
            None => {
                let mut record = Record::from_remote(partition, entry);
                record.updated_at = entry.updated_at;
                store.put(&record, SyncState::Clean)?;
                stats.inserted += 1;
            }
        }
    }

    debug!(
        partition,
        inserted = stats.inserted,
        updated = stats.updated,
        removed = stats.removed,
        skipped_dirty = stats.skipped_dirty,
        "Merged remote listing"
    );
    Ok(stats)
}
