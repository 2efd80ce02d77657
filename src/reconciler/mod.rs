// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync passes.
//!
//! The [`Reconciler`] runs one pass at a time:
//!
//! 1. Probe the remote (optional). If it is unreachable the pass ends and
//!    every record stays dirty.
//! 2. Collect the dirty set from the store.
//! 3. Issue one remote operation per dirty record, concurrently, bounded by
//!    `max_in_flight`.
//! 4. Apply each response as it completes. Failures leave the record as it
//!    was for the next pass.
//! 5. Refresh the remote listing of every partition the pass touched.
//!
//! # Example
//!
//! ```
//! # use std::sync::Arc;
//! use offline_sync::{InMemoryRemote, MemoryStore, Reconciler, Record, RecordStore, SyncQueueConfig, SyncState};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(MemoryStore::new());
//! store.put(&Record::new("blog", "Hello", "").with_local_id("a1"), SyncState::PendingCreate).unwrap();
//!
//! let reconciler = Reconciler::new(store.clone(), Arc::new(InMemoryRemote::new()), SyncQueueConfig::default());
//! let outcome = reconciler.run_sync_pass().await;
//!
//! assert_eq!(outcome.report().unwrap().created, 1);
//! assert_eq!(store.get("a1").unwrap().unwrap().state, SyncState::Clean);
//! # }
//! ```

mod apply;
mod refresh;
pub mod types;

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::SyncQueueConfig;
use crate::record::StoredRecord;
use crate::remote::{RemoteError, RemoteService};
use crate::resilience::health::ConnectivityMonitor;
use crate::resilience::retry::{retry, RetryConfig};
use crate::storage::{RecordStore, StoreError};
use crate::sync_state::SyncState;

pub use types::{OpKind, PassOutcome, PassReport};
use types::{Applied, OpResponse};

/// RAII guard that clears the in-flight flag when dropped.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    remote: Arc<dyn RemoteService>,
    config: RwLock<SyncQueueConfig>,
    /// Serializes read-modify-write sequences on the store
    write_lock: Mutex<()>,
    in_flight: AtomicBool,
    connectivity: ConnectivityMonitor,
    refresh_retry: RetryConfig,
    passes_completed: AtomicU64,
    last_report: Mutex<Option<PassReport>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        remote: Arc<dyn RemoteService>,
        config: SyncQueueConfig,
    ) -> Self {
        Self {
            store,
            remote,
            config: RwLock::new(config),
            write_lock: Mutex::new(()),
            in_flight: AtomicBool::new(false),
            connectivity: ConnectivityMonitor::new(),
            refresh_retry: RetryConfig::query(),
            passes_completed: AtomicU64::new(0),
            last_report: Mutex::new(None),
        }
    }

    /// Backoff used when a listing refresh fails.
    #[must_use]
    pub fn with_refresh_retry(mut self, refresh_retry: RetryConfig) -> Self {
        self.refresh_retry = refresh_retry;
        self
    }

    /// Apply new settings; they take effect from the next pass.
    pub fn update_config(&self, config: SyncQueueConfig) {
        *self.config.write() = config;
    }

    #[must_use]
    pub fn config(&self) -> SyncQueueConfig {
        self.config.read().clone()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    #[must_use]
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Whether a pass is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn passes_completed(&self) -> u64 {
        self.passes_completed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn last_report(&self) -> Option<PassReport> {
        self.last_report.lock().clone()
    }

    /// Lock held by anything that reads a record, changes it, and writes it
    /// back. Never held across an await.
    pub(crate) fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock()
    }

    /// Run one sync pass. Returns [`PassOutcome::Skipped`] without touching
    /// the remote if another pass is in flight.
    #[tracing::instrument(skip(self))]
    pub async fn run_sync_pass(&self) -> PassOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("Sync pass already in flight, skipping");
            crate::metrics::record_pass_skipped();
            return PassOutcome::Skipped;
        }
        let _guard = PassGuard(&self.in_flight);

        let start = Instant::now();
        let config = self.config();

        if config.probe_before_pass {
            let probe = self.connectivity.check(self.remote.as_ref()).await;
            crate::metrics::set_remote_reachable(self.connectivity.is_reachable());
            if let Err(e) = probe {
                crate::metrics::record_remote_operation("probe", "error");
                crate::metrics::record_pass("offline", start.elapsed());
                self.update_dirty_gauge();
                warn!(error = %e, failures = self.connectivity.failure_count(), "Remote probe failed, records stay dirty");
                return PassOutcome::Offline(e);
            }
        }

        let dirty = match self.collect_dirty(config.scan_page_size) {
            Ok(dirty) => dirty,
            Err(e) => {
                error!(error = %e, "Failed to read dirty records");
                crate::metrics::record_pass("store_error", start.elapsed());
                return PassOutcome::StoreUnavailable(e.to_string());
            }
        };

        let mut report = PassReport {
            total: dirty.len(),
            ..Default::default()
        };
        if dirty.is_empty() {
            debug!("Nothing to sync");
        } else {
            info!(count = dirty.len(), "Attempting to sync dirty records");
        }

        let partitions = self.run_operations(dirty, config.max_in_flight, &mut report).await;

        if config.refresh_after_pass {
            for partition in &partitions {
                if self.refresh_partition(partition).await {
                    report.refreshed.push(partition.clone());
                }
            }
        }

        report.duration = start.elapsed();
        let status = if report.is_success() { "completed" } else { "partial" };
        crate::metrics::record_pass(status, report.duration);
        self.update_dirty_gauge();

        if report.total > 0 {
            info!(
                total = report.total,
                succeeded = report.succeeded,
                failed = report.failed,
                superseded = report.superseded,
                refreshed = report.refreshed.len(),
                duration_ms = report.duration.as_millis() as u64,
                "Sync pass finished"
            );
        }

        self.passes_completed.fetch_add(1, Ordering::Relaxed);
        *self.last_report.lock() = Some(report.clone());
        PassOutcome::Completed(report)
    }

    /// Snapshot the dirty set, at most one entry per record.
    ///
    /// Saves are held off while paging. Duplicates are still dropped in case
    /// the store shifts under the scan some other way.
    fn collect_dirty(&self, page_size: usize) -> Result<Vec<StoredRecord>, StoreError> {
        let _w = self.write_lock();
        let mut seen = HashSet::new();
        let mut dirty = Vec::new();
        for stored in self.store.list_by_state(&SyncState::DIRTY).with_page_size(page_size) {
            let stored = stored?;
            if seen.insert(stored.record.local_id.clone()) {
                dirty.push(stored);
            } else {
                debug!(local_id = %stored.local_id(), "Record listed twice, sending once");
            }
        }
        Ok(dirty)
    }

    /// Issue the remote operations and apply their results. Returns the
    /// partitions touched.
    async fn run_operations(
        &self,
        dirty: Vec<StoredRecord>,
        max_in_flight: usize,
        report: &mut PassReport,
    ) -> BTreeSet<String> {
        let mut partitions = BTreeSet::new();
        let semaphore = Arc::new(Semaphore::new(max_in_flight.max(1)));
        let mut tasks = JoinSet::new();
        let mut tombstones = 0;

        for stored in dirty {
            partitions.insert(stored.record.partition.clone());

            if stored.state == SyncState::PendingDelete && stored.record.remote_id.is_none() {
                let dropped = {
                    let _w = self.write_lock();
                    apply::drop_tombstone(self.store.as_ref(), &stored)
                };
                match dropped {
                    Ok(true) => {
                        report.succeeded += 1;
                        report.dropped += 1;
                        tombstones += 1;
                    }
                    Ok(false) => report.superseded += 1,
                    Err(e) => {
                        report.failed += 1;
                        error!(local_id = %stored.local_id(), error = %e, "Failed to drop tombstone");
                    }
                }
                continue;
            }

            let remote = Arc::clone(&self.remote);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                let response = dispatch(remote.as_ref(), &stored).await;
                (stored, response)
            });
        }
        if tombstones > 0 {
            crate::metrics::record_dropped_tombstones(tombstones);
        }

        while let Some(joined) = tasks.join_next().await {
            let (stored, response) = match joined {
                Ok(done) => done,
                Err(e) => {
                    report.failed += 1;
                    error!(error = %e, "Sync task panicked");
                    continue;
                }
            };
            self.record_result(&stored, response, report);
        }

        partitions
    }

    fn record_result(
        &self,
        stored: &StoredRecord,
        response: Result<OpResponse, RemoteError>,
        report: &mut PassReport,
    ) {
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                report.failed += 1;
                warn!(
                    local_id = %stored.local_id(),
                    state = %stored.state,
                    kind = e.kind(),
                    error = %e,
                    "Remote operation failed, record stays dirty"
                );
                return;
            }
        };

        let applied = {
            let _w = self.write_lock();
            apply::apply_success(self.store.as_ref(), stored, response)
        };
        match applied {
            Ok(applied) => {
                report.succeeded += 1;
                match applied {
                    Applied::Created => report.created += 1,
                    Applied::Updated => report.updated += 1,
                    Applied::Deleted => report.deleted += 1,
                    Applied::CreatedStillDirty => {
                        report.created += 1;
                        report.superseded += 1;
                    }
                    Applied::Superseded => report.superseded += 1,
                }
            }
            Err(e) => {
                report.failed += 1;
                error!(local_id = %stored.local_id(), error = %e, "Failed to apply remote response");
            }
        }
    }

    /// Merge the remote listing of `partition`. Best-effort: failures are
    /// logged and reported as `false`.
    async fn refresh_partition(&self, partition: &str) -> bool {
        let remote = self.remote.as_ref();
        let listing = {
            let _timer = crate::metrics::LatencyTimer::new("list");
            retry("refresh_listing", &self.refresh_retry, || remote.list(partition)).await
        };
        let listing = match listing {
            Ok(listing) => {
                crate::metrics::record_remote_operation("list", "success");
                listing
            }
            Err(e) => {
                crate::metrics::record_remote_operation("list", "error");
                crate::metrics::record_refresh(false, 0);
                warn!(partition, error = %e, "Listing refresh failed");
                return false;
            }
        };

        let merged = {
            let _w = self.write_lock();
            refresh::merge_listing(self.store.as_ref(), partition, &listing)
        };
        match merged {
            Ok(stats) => {
                crate::metrics::record_refresh(true, stats.merged());
                true
            }
            Err(e) => {
                crate::metrics::record_refresh(false, 0);
                error!(partition, error = %e, "Failed to merge remote listing");
                false
            }
        }
    }

    fn update_dirty_gauge(&self) {
        match self.store.count_by_state(&SyncState::DIRTY) {
            Ok(count) => crate::metrics::set_dirty_records(count),
            Err(e) => debug!(error = %e, "Could not count dirty records"),
        }
    }
}

/// Issue the remote call matching the record's state.
async fn dispatch(remote: &dyn RemoteService, stored: &StoredRecord) -> Result<OpResponse, RemoteError> {
    let record = &stored.record;
    let Some(kind) = OpKind::for_state(stored.state) else {
        return Err(RemoteError::Rejected(format!("'{}' is already clean", record.local_id)));
    };

    let result = {
        let _timer = crate::metrics::LatencyTimer::new(kind.as_str());
        match (kind, record.remote_id.as_deref()) {
            (OpKind::Create, _) => remote.create(&record.partition, record).await.map(OpResponse::Created),
            (OpKind::Update, Some(remote_id)) => remote.update(remote_id, record).await.map(OpResponse::Updated),
            (OpKind::Delete, Some(remote_id)) => remote.delete(remote_id).await.map(|()| OpResponse::Deleted),
            (_, None) => Err(RemoteError::Rejected(format!(
                "'{}' has no remote id to {}",
                record.local_id, kind
            ))),
        }
    };

    let status = if result.is_ok() { "success" } else { "error" };
    crate::metrics::record_remote_operation(kind.as_str(), status);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::remote::InMemoryRemote;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    fn setup(remote: InMemoryRemote) -> (Arc<MemoryStore>, Arc<InMemoryRemote>, Reconciler) {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(remote);
        let reconciler = Reconciler::new(store.clone(), remote.clone(), SyncQueueConfig::default())
            .with_refresh_retry(RetryConfig::test());
        (store, remote, reconciler)
    }

    fn post(id: &str) -> Record {
        Record::new("blog", format!("post {}", id), "body").with_local_id(id)
    }

    #[tokio::test]
    async fn test_empty_pass() {
        let (_store, remote, reconciler) = setup(InMemoryRemote::new());
        let outcome = reconciler.run_sync_pass().await;

        let report = outcome.report().unwrap();
        assert_eq!(report.total, 0);
        assert!(report.refreshed.is_empty());
        assert_eq!(remote.calls().mutations(), 0);
        assert_eq!(remote.calls().lists, 0);
        assert_eq!(reconciler.passes_completed(), 1);
    }

    #[tokio::test]
    async fn test_pass_issues_one_op_per_dirty_record() {
        let (store, remote, reconciler) = setup(InMemoryRemote::new());
        let existing = remote.seed("blog", "old", "body");
        store.put(&post("new"), SyncState::PendingCreate).unwrap();
        store
            .put(&post("edit").with_remote_id(existing.remote_id.clone()), SyncState::PendingUpdate)
            .unwrap();
        store.put(&post("clean").with_remote_id("r-none"), SyncState::Clean).unwrap();

        let report = reconciler.run_sync_pass().await.report().cloned().unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);
        let calls = remote.calls();
        assert_eq!((calls.creates, calls.updates, calls.deletes), (1, 1, 0));
        assert_eq!(store.count_by_state(&SyncState::DIRTY).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tombstone_without_remote_id_needs_no_call() {
        let (store, remote, reconciler) = setup(InMemoryRemote::new());
        store.put(&post("t"), SyncState::PendingDelete).unwrap();

        let report = reconciler.run_sync_pass().await.report().cloned().unwrap();

        assert_eq!(report.dropped, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(remote.calls().deletes, 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_offline_probe_keeps_everything_dirty() {
        let (store, remote, reconciler) = setup(InMemoryRemote::new());
        store.put(&post("a"), SyncState::PendingCreate).unwrap();
        remote.set_online(false);

        let outcome = reconciler.run_sync_pass().await;

        assert!(matches!(outcome, PassOutcome::Offline(RemoteError::Network(_))));
        assert_eq!(remote.calls().mutations(), 0);
        assert_eq!(store.get("a").unwrap().unwrap().state, SyncState::PendingCreate);
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_skipped() {
        let (store, remote, reconciler) =
            setup(InMemoryRemote::new().with_latency(Duration::from_millis(50)));
        store.put(&post("a"), SyncState::PendingCreate).unwrap();

        let (first, second) = tokio::join!(reconciler.run_sync_pass(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            reconciler.run_sync_pass().await
        });

        assert!(matches!(first, PassOutcome::Completed(_)));
        assert!(second.is_skipped());
        assert_eq!(remote.calls().creates, 1);
        assert!(!reconciler.is_running());
    }

    #[tokio::test]
    async fn test_refresh_once_per_touched_partition() {
        let (store, remote, reconciler) = setup(InMemoryRemote::new());
        store.put(&post("a"), SyncState::PendingCreate).unwrap();
        store.put(&post("b"), SyncState::PendingCreate).unwrap();
        store
            .put(&Record::new("other", "c", "").with_local_id("c"), SyncState::PendingCreate)
            .unwrap();

        let report = reconciler.run_sync_pass().await.report().cloned().unwrap();

        assert_eq!(report.refreshed, vec!["blog".to_string(), "other".to_string()]);
        assert_eq!(remote.calls().lists, 2);
    }

    #[tokio::test]
    async fn test_refresh_disabled() {
        let (store, remote, reconciler) = setup(InMemoryRemote::new());
        reconciler.update_config(SyncQueueConfig {
            refresh_after_pass: false,
            probe_before_pass: false,
            ..Default::default()
        });
        store.put(&post("a"), SyncState::PendingCreate).unwrap();

        reconciler.run_sync_pass().await;

        let calls = remote.calls();
        assert_eq!(calls.lists, 0);
        assert_eq!(calls.probes, 0);
        assert_eq!(calls.creates, 1);
    }

    #[tokio::test]
    async fn test_failed_update_stays_dirty() {
        let (store, _remote, reconciler) = setup(InMemoryRemote::new());
        // Unknown remote id: the remote answers with a conflict.
        store.put(&post("a").with_remote_id("r404"), SyncState::PendingUpdate).unwrap();

        let report = reconciler.run_sync_pass().await.report().cloned().unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(store.get("a").unwrap().unwrap().state, SyncState::PendingUpdate);
        assert_eq!(reconciler.last_report(), Some(report));
    }

    /// Store that gains a newer dirty record between the first and second
    /// page of a dirty scan, shifting every later offset by one.
    struct ShiftingStore {
        inner: MemoryStore,
        dirty_scans: std::sync::atomic::AtomicUsize,
    }

    impl RecordStore for ShiftingStore {
        fn put(&self, record: &Record, state: SyncState) -> Result<(), StoreError> {
            self.inner.put(record, state)
        }

        fn get(&self, local_id: &str) -> Result<Option<StoredRecord>, StoreError> {
            self.inner.get(local_id)
        }

        fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<StoredRecord>, StoreError> {
            self.inner.find_by_remote_id(remote_id)
        }

        fn scan_by_state(&self, states: &[SyncState], offset: usize, limit: usize) -> Result<Vec<StoredRecord>, StoreError> {
            if states.contains(&SyncState::PendingCreate) && self.dirty_scans.fetch_add(1, Ordering::SeqCst) == 1 {
                let mut newest = post("d");
                newest.updated_at = 400;
                self.inner.put(&newest, SyncState::PendingCreate)?;
            }
            self.inner.scan_by_state(states, offset, limit)
        }

        fn list_by_state(&self, states: &[SyncState]) -> crate::storage::StateScan<'_> {
            crate::storage::StateScan::new(self, states)
        }

        fn count_by_state(&self, states: &[SyncState]) -> Result<u64, StoreError> {
            self.inner.count_by_state(states)
        }

        fn remove(&self, local_id: &str) -> Result<bool, StoreError> {
            self.inner.remove(local_id)
        }
    }

    #[tokio::test]
    async fn test_store_shift_between_pages_sends_each_record_once() {
        let store = Arc::new(ShiftingStore {
            inner: MemoryStore::new(),
            dirty_scans: std::sync::atomic::AtomicUsize::new(0),
        });
        for (id, updated_at) in [("a", 300), ("b", 200), ("c", 100)] {
            let mut record = post(id);
            record.updated_at = updated_at;
            store.put(&record, SyncState::PendingCreate).unwrap();
        }
        let remote = Arc::new(InMemoryRemote::new());
        let reconciler = Reconciler::new(
            store.clone(),
            remote.clone(),
            SyncQueueConfig {
                scan_page_size: 2,
                refresh_after_pass: false,
                ..Default::default()
            },
        );

        let report = reconciler.run_sync_pass().await.report().cloned().unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.created, 3);
        assert_eq!(remote.calls().creates, 3);
        assert_eq!(remote.len(), 3);
        // The late record is picked up by the next pass.
        assert_eq!(store.get("d").unwrap().unwrap().state, SyncState::PendingCreate);

        reconciler.run_sync_pass().await;
        assert_eq!(remote.calls().creates, 4);
        assert_eq!(store.count_by_state(&SyncState::DIRTY).unwrap(), 0);
    }
}
