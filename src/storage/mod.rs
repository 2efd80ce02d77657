// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record stores.
//!
//! - [`MemoryStore`]: concurrent map, nothing survives a restart
//! - [`SqliteStore`]: durable SQLite file
//!
//! Both implement [`RecordStore`] and share the same listing order.

pub mod memory;
pub mod scan;
pub mod sqlite;
pub mod traits;

pub use memory::MemoryStore;
pub use scan::{StateScan, DEFAULT_PAGE_SIZE};
pub use sqlite::SqliteStore;
pub use traits::{RecordStore, StoreError};
