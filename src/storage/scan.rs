// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Paged, restartable listing over a [`RecordStore`].

use std::collections::VecDeque;

use crate::record::StoredRecord;
use crate::sync_state::SyncState;
use super::traits::{RecordStore, StoreError};

/// Default number of records fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Lazy sequence of records in listing order.
///
/// Pages are fetched on demand with [`RecordStore::scan_by_state`]. A scan
/// yields at most one error and then ends. Call [`restart`](Self::restart)
/// to iterate again from the first record.
pub struct StateScan<'a> {
    store: &'a dyn RecordStore,
    states: Vec<SyncState>,
    page_size: usize,
    offset: usize,
    buffer: VecDeque<StoredRecord>,
    done: bool,
}

impl<'a> StateScan<'a> {
    pub fn new(store: &'a dyn RecordStore, states: &[SyncState]) -> Self {
        Self {
            store,
            states: states.to_vec(),
            page_size: DEFAULT_PAGE_SIZE,
            offset: 0,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Rewind to the first record. The next page is read fresh from the store.
    pub fn restart(&mut self) {
        self.offset = 0;
        self.buffer.clear();
        self.done = false;
    }

    /// Drain the scan into a vec, stopping at the first error.
    pub fn collect_records(self) -> Result<Vec<StoredRecord>, StoreError> {
        self.collect()
    }

    fn fill(&mut self) -> Result<(), StoreError> {
        let page = self.store.scan_by_state(&self.states, self.offset, self.page_size)?;
        if page.len() < self.page_size {
            self.done = true;
        }
        self.offset += page.len();
        self.buffer.extend(page);
        Ok(())
    }
}

impl Iterator for StateScan<'_> {
    type Item = Result<StoredRecord, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fill() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
