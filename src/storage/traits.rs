// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use thiserror::Error;

use crate::record::{Record, StoredRecord, ValidationError};
use crate::sync_state::SyncState;
use super::scan::StateScan;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Durable keyed storage for records and their sync state.
///
/// All operations are synchronous: the store is local and the queue never
/// suspends while touching it. Listings are ordered dirty records first,
/// then most recently edited, then by local id.
pub trait RecordStore: Send + Sync {
    /// Upsert `record` with `state`, validating it first.
    fn put(&self, record: &Record, state: SyncState) -> Result<(), StoreError>;

    fn get(&self, local_id: &str) -> Result<Option<StoredRecord>, StoreError>;

    fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<StoredRecord>, StoreError>;

    /// One page of records whose state is in `states`.
    /// Returns an empty vec when `offset` is past the end.
    fn scan_by_state(
        &self,
        states: &[SyncState],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<StoredRecord>, StoreError>;

    /// Lazy, restartable listing built on [`scan_by_state`](Self::scan_by_state).
    fn list_by_state(&self, states: &[SyncState]) -> StateScan<'_>;

    fn count_by_state(&self, states: &[SyncState]) -> Result<u64, StoreError>;

    /// Delete permanently. Returns whether a record was removed.
    fn remove(&self, local_id: &str) -> Result<bool, StoreError>;
}

/// Listing order shared by every store: dirty first, newest edit first,
/// then local id for a stable order.
pub(crate) fn listing_order(a: &StoredRecord, b: &StoredRecord) -> std::cmp::Ordering {
    a.state
        .rank()
        .cmp(&b.state.rank())
        .then_with(|| b.record.updated_at.cmp(&a.record.updated_at))
        .then_with(|| a.record.local_id.cmp(&b.record.local_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(id: &str, state: SyncState, updated_at: i64) -> StoredRecord {
        let mut record = Record::new("blog", "t", "b").with_local_id(id);
        record.updated_at = updated_at;
        StoredRecord::new(record, state)
    }

    #[test]
    fn test_listing_order() {
        let mut records = vec![
            stored("c", SyncState::Clean, 300),
            stored("b", SyncState::PendingCreate, 100),
            stored("a", SyncState::PendingCreate, 100),
            stored("d", SyncState::PendingDelete, 50),
            stored("e", SyncState::PendingCreate, 200),
        ];
        records.sort_by(listing_order);

        let ids: Vec<&str> = records.iter().map(|r| r.local_id()).collect();
        assert_eq!(ids, vec!["e", "a", "b", "d", "c"]);
    }

    #[test]
    fn test_validation_error_converts() {
        let err: StoreError = ValidationError::MissingField("partition").into();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(err.to_string(), "Missing required field: partition");
    }
}
