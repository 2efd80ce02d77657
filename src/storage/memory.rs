// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use dashmap::DashMap;

use crate::record::{Record, StoredRecord};
use crate::sync_state::SyncState;
use super::scan::StateScan;
use super::traits::{listing_order, RecordStore, StoreError};

/// Non-durable store for tests and ephemeral queues.
pub struct MemoryStore {
    data: DashMap<String, StoredRecord>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current record count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&self) {
        self.data.clear();
    }

    fn matching(&self, states: &[SyncState]) -> Vec<StoredRecord> {
        self.data
            .iter()
            .filter(|r| states.contains(&r.value().state))
            .map(|r| r.value().clone())
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn put(&self, record: &Record, state: SyncState) -> Result<(), StoreError> {
        record.validate(state)?;
        self.data
            .insert(record.local_id.clone(), StoredRecord::new(record.clone(), state));
        Ok(())
    }

    fn get(&self, local_id: &str) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.data.get(local_id).map(|r| r.value().clone()))
    }

    fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self
            .data
            .iter()
            .find(|r| r.value().record.remote_id.as_deref() == Some(remote_id))
            .map(|r| r.value().clone()))
    }

    fn scan_by_state(
        &self,
        states: &[SyncState],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let mut records = self.matching(states);
        records.sort_by(listing_order);
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    fn list_by_state(&self, states: &[SyncState]) -> StateScan<'_> {
        StateScan::new(self, states)
    }

    fn count_by_state(&self, states: &[SyncState]) -> Result<u64, StoreError> {
        Ok(self
            .data
            .iter()
            .filter(|r| states.contains(&r.value().state))
            .count() as u64)
    }

    fn remove(&self, local_id: &str) -> Result<bool, StoreError> {
        Ok(self.data.remove(local_id).is_some())
    }
}
