// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Offline Sync
//!
//! A local-first sync queue: records are written to a local store at once,
//! marked dirty, and reconciled against a remote service on a recurring
//! schedule. The UI never waits on the network, and connectivity may come
//! and go.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SyncQueue                           │
//! │  • save / delete: local write, mark dirty                  │
//! │  • get / list_partition: render straight from the store    │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                   │
//!            ▼                                   ▼
//! ┌──────────────────────────┐     ┌────────────────────────────┐
//! │       Record Store       │     │         Scheduler          │
//! │  • MemoryStore (DashMap) │     │  • tick every interval     │
//! │  • SqliteStore (durable) │     │  • pause / resume / stop   │
//! │  • SyncState per record  │     └────────────────────────────┘
//! └──────────────────────────┘                   │
//!            ▲                                   ▼
//!            │                     ┌────────────────────────────┐
//!            └──── apply results ──│         Reconciler         │
//!                                  │  • one pass at a time      │
//!                                  │  • one op per dirty record │
//!                                  │  • listing refresh         │
//!                                  └────────────────────────────┘
//!                                                │
//!                                                ▼
//!                                         RemoteService
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use offline_sync::{InMemoryRemote, Record, SyncQueue, SyncQueueConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SyncQueueConfig {
//!         store_path: Some("posts.db".into()),
//!         ..Default::default()
//!     };
//!
//!     let queue = SyncQueue::open(config, Arc::new(InMemoryRemote::new()))
//!         .await
//!         .expect("Failed to open queue");
//!
//!     // Sync every 20 seconds in the background
//!     queue.start();
//!
//!     // Local write; shows up in listings immediately
//!     let post = Record::new("blog-1", "Hello", "First post").with_tags(["intro"]);
//!     queue.save(post).expect("Failed to save");
//!
//!     for stored in queue.list_partition("blog-1").unwrap() {
//!         println!("[{}] {}", stored.state, stored.record.title);
//!     }
//!
//!     queue.stop();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`queue`]: The [`SyncQueue`] context tying everything together
//! - [`storage`]: Record stores (memory, SQLite)
//! - [`sync_state`]: Per-record state machine
//! - [`reconciler`]: Sync passes
//! - [`scheduler`]: Recurring passes
//! - [`remote`]: Remote service trait and an in-memory implementation
//! - [`resilience`]: Retry logic, connectivity tracking

pub mod config;
pub mod metrics;
pub mod queue;
pub mod reconciler;
pub mod record;
pub mod remote;
pub mod resilience;
pub mod scheduler;
pub mod storage;
pub mod sync_state;

pub use config::SyncQueueConfig;
pub use queue::{QueueStatus, SyncError, SyncQueue};
pub use reconciler::{OpKind, PassOutcome, PassReport, Reconciler};
pub use record::{Record, StoredRecord, ValidationError};
pub use remote::{InMemoryRemote, RemoteCalls, RemoteError, RemoteRecord, RemoteService};
pub use resilience::health::ConnectivityMonitor;
pub use resilience::retry::RetryConfig;
pub use scheduler::{Scheduler, SchedulerState};
pub use storage::{MemoryStore, RecordStore, SqliteStore, StateScan, StoreError};
pub use sync_state::{Settled, SyncState};
pub use crate::metrics::LatencyTimer;
