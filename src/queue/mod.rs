// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The sync queue: local writes now, remote sync later.
//!
//! [`SyncQueue`] owns the record store, the reconciler and the scheduler.
//! Every UI-facing operation goes through it:
//!
//! - **Writes** ([`save`](SyncQueue::save), [`delete`](SyncQueue::delete))
//!   land in the store immediately and mark the record dirty
//! - **Reads** ([`get`](SyncQueue::get), [`list_partition`](SyncQueue::list_partition))
//!   come straight from the store, so the UI renders without waiting on the
//!   network
//! - **Sync** happens on the schedule, or on demand with
//!   [`sync_now`](SyncQueue::sync_now)
//!
//! # Example
//!
//! ```
//! # use std::sync::Arc;
//! use offline_sync::{InMemoryRemote, Record, SyncQueue, SyncQueueConfig, SyncState};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), offline_sync::SyncError> {
//! let remote = Arc::new(InMemoryRemote::new());
//! let queue = SyncQueue::open(SyncQueueConfig::default(), remote).await?;
//!
//! let saved = queue.save(Record::new("blog", "Hello", "First post"))?;
//! assert_eq!(saved.state, SyncState::PendingCreate);
//!
//! queue.sync_now().await;
//! let synced = queue.get(saved.local_id())?.unwrap();
//! assert_eq!(synced.state, SyncState::Clean);
//! assert!(synced.record.remote_id.is_some());
//! # Ok(())
//! # }
//! ```

pub mod types;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::SyncQueueConfig;
use crate::reconciler::{PassOutcome, Reconciler};
use crate::record::{now_millis, Record, StoredRecord};
use crate::remote::RemoteService;
use crate::resilience::retry::{retry, RetryConfig};
use crate::scheduler::{Scheduler, SchedulerState};
use crate::storage::{MemoryStore, RecordStore, SqliteStore, StateScan};
use crate::sync_state::SyncState;

pub use types::{QueueStatus, SyncError};

/// Visible states of a partition listing; tombstones are hidden.
const VISIBLE: [SyncState; 3] = [
    SyncState::PendingUpdate,
    SyncState::PendingCreate,
    SyncState::Clean,
];

pub struct SyncQueue {
    store: Arc<dyn RecordStore>,
    reconciler: Arc<Reconciler>,
    scheduler: Scheduler,
    config_tx: watch::Sender<SyncQueueConfig>,
}

impl SyncQueue {
    /// Build a queue from config: a SQLite store when `store_path` is set,
    /// otherwise an in-memory one.
    #[tracing::instrument(skip(config, remote), fields(store_path = ?config.store_path))]
    pub async fn open(config: SyncQueueConfig, remote: Arc<dyn RemoteService>) -> Result<Self, SyncError> {
        config.validate().map_err(SyncError::Config)?;

        let store: Arc<dyn RecordStore> = match &config.store_path {
            Some(path) => {
                let sqlite = retry("open_store", &RetryConfig::startup(), || async {
                    SqliteStore::open(path)
                })
                .await?;
                Arc::new(sqlite)
            }
            None => {
                debug!("No store path configured, records will not survive a restart");
                Arc::new(MemoryStore::new())
            }
        };

        Self::with_store(config, store, remote)
    }

    /// Build a queue around an existing store.
    pub fn with_store(
        config: SyncQueueConfig,
        store: Arc<dyn RecordStore>,
        remote: Arc<dyn RemoteService>,
    ) -> Result<Self, SyncError> {
        config.validate().map_err(SyncError::Config)?;

        let (config_tx, config_rx) = watch::channel(config.clone());
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&store), remote, config));
        let scheduler = Scheduler::new(Arc::clone(&reconciler), config_rx);

        Ok(Self {
            store,
            reconciler,
            scheduler,
            config_tx,
        })
    }

    /// Save a new or edited record locally and mark it for sync.
    ///
    /// The state follows the record's history: a first save is a pending
    /// create (or update, if it already has a remote id), an edit of a clean
    /// record is a pending update, and a record pending deletion stays so.
    /// Remote-derived fields the caller left empty are kept from the stored
    /// copy.
    pub fn save(&self, draft: Record) -> Result<StoredRecord, SyncError> {
        let _w = self.reconciler.write_lock();
        let mut record = draft;

        let state = match self.store.get(&record.local_id)? {
            Some(previous) => {
                let prev = previous.record;
                if record.remote_id.is_none() {
                    record.remote_id = prev.remote_id;
                }
                if record.author.is_none() {
                    record.author = prev.author;
                }
                if record.permalink.is_none() {
                    record.permalink = prev.permalink;
                }
                if record.remote_updated_at.is_none() {
                    record.remote_updated_at = prev.remote_updated_at;
                }
                record.revision = prev.revision + 1;
                previous.state.on_edit()
            }
            None => {
                record.revision = 1;
                SyncState::for_new_record(record.remote_id.is_some())
            }
        };
        record.updated_at = now_millis();

        self.store.put(&record, state)?;
        debug!(local_id = %record.local_id, state = %state, revision = record.revision, "Record saved");
        Ok(StoredRecord::new(record, state))
    }

    /// Mark a record for deletion. It disappears from partition listings at
    /// once and from the store after the remote confirms.
    pub fn delete(&self, local_id: &str) -> Result<StoredRecord, SyncError> {
        let _w = self.reconciler.write_lock();
        let Some(mut stored) = self.store.get(local_id)? else {
            return Err(SyncError::NotFound(local_id.to_string()));
        };

        stored.state = stored.state.on_delete();
        stored.record.revision += 1;
        stored.record.updated_at = now_millis();
        self.store.put(&stored.record, stored.state)?;
        debug!(local_id = %local_id, "Record marked for deletion");
        Ok(stored)
    }

    pub fn get(&self, local_id: &str) -> Result<Option<StoredRecord>, SyncError> {
        Ok(self.store.get(local_id)?)
    }

    /// Lazy listing of the records in `states`, dirty first.
    pub fn list(&self, states: &[SyncState]) -> StateScan<'_> {
        self.store
            .list_by_state(states)
            .with_page_size(self.config_tx.borrow().scan_page_size)
    }

    /// What the UI shows for one partition: dirty records first, then by
    /// most recent edit. Records pending deletion are hidden.
    pub fn list_partition(&self, partition: &str) -> Result<Vec<StoredRecord>, SyncError> {
        let mut records = Vec::new();
        for stored in self.list(&VISIBLE) {
            let stored = stored?;
            if stored.record.partition == partition {
                records.push(stored);
            }
        }
        Ok(records)
    }

    /// Save, then sync at once. The schedule is paused around the save so
    /// the next scheduled pass is a full interval away. A queue the caller
    /// paused stays paused.
    pub async fn save_and_sync(&self, draft: Record) -> Result<(StoredRecord, PassOutcome), SyncError> {
        let paused_here = self.scheduler.pause();
        let result = self.save_then_sync(draft).await;
        if paused_here {
            self.scheduler.resume();
        }
        result
    }

    async fn save_then_sync(&self, draft: Record) -> Result<(StoredRecord, PassOutcome), SyncError> {
        let saved = self.save(draft)?;
        let outcome = self.reconciler.run_sync_pass().await;
        let current = self.store.get(saved.local_id())?.unwrap_or(saved);
        Ok((current, outcome))
    }

    /// Start the recurring schedule with the configured interval.
    pub fn start(&self) -> bool {
        let interval = self.config_tx.borrow().sync_interval();
        self.scheduler.start(interval)
    }

    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Run one pass now.
    pub async fn sync_now(&self) -> PassOutcome {
        self.scheduler.run_once().await
    }

    /// Returns whether this call paused the schedule.
    pub fn pause(&self) -> bool {
        self.scheduler.pause()
    }

    pub fn resume(&self) {
        self.scheduler.resume();
    }

    /// Replace the configuration. The interval change reaches a running
    /// scheduler on its next loop iteration; `store_path` is fixed at open.
    pub fn update_config(&self, config: SyncQueueConfig) -> Result<(), SyncError> {
        config.validate().map_err(SyncError::Config)?;
        info!(interval_ms = config.sync_interval_ms, max_in_flight = config.max_in_flight, "Updating sync queue config");
        self.reconciler.update_config(config.clone());
        self.config_tx.send_replace(config);
        Ok(())
    }

    pub fn status(&self) -> Result<QueueStatus, SyncError> {
        let count = |state: SyncState| self.store.count_by_state(&[state]);
        Ok(QueueStatus {
            scheduler: self.scheduler.state(),
            pending_create: count(SyncState::PendingCreate)?,
            pending_update: count(SyncState::PendingUpdate)?,
            pending_delete: count(SyncState::PendingDelete)?,
            clean: count(SyncState::Clean)?,
            pass_in_flight: self.reconciler.is_running(),
            remote_reachable: self.reconciler.connectivity().is_reachable(),
            passes_completed: self.reconciler.passes_completed(),
            last_pass: self.reconciler.last_report(),
        })
    }

    #[must_use]
    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }
}
