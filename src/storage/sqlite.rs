// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite record store.
//!
//! Schema:
//! ```sql
//! CREATE TABLE records (
//!   local_id          TEXT PRIMARY KEY,
//!   remote_id         TEXT,
//!   partition_key     TEXT NOT NULL,
//!   title             TEXT NOT NULL,
//!   body              TEXT NOT NULL,
//!   tags              TEXT NOT NULL,     -- JSON array
//!   draft             INTEGER NOT NULL,
//!   author            TEXT,
//!   permalink         TEXT,
//!   remote_updated_at INTEGER,
//!   updated_at        INTEGER NOT NULL,
//!   revision          INTEGER NOT NULL,
//!   sync_state        TEXT NOT NULL,
//!   state_rank        INTEGER NOT NULL   -- listing order, dirty first
//! )
//! ```
//!
//! Every statement is a fixed parameterised query. The connection sits behind
//! a `parking_lot::Mutex`; calls are short and never held across an await.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::record::{Record, StoredRecord};
use crate::sync_state::SyncState;
use super::scan::StateScan;
use super::traits::{RecordStore, StoreError};

const SELECT_COLUMNS: &str = "local_id, remote_id, partition_key, title, body, tags, draft, author, \
     permalink, remote_updated_at, updated_at, revision, sync_state";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

fn backend(context: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("{}: {}", context, e))
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| backend("open SQLite DB failed", e))?;

        // WAL keeps readers from blocking the sync pass's writes.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| backend("set WAL mode failed", e))?;

        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.init_schema()?;
        info!(path = %path.display(), "Opened SQLite record store");
        Ok(store)
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| backend("open in-memory SQLite failed", e))?;
        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Path of the database file, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                local_id TEXT PRIMARY KEY,
                remote_id TEXT,
                partition_key TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                draft INTEGER NOT NULL DEFAULT 0,
                author TEXT,
                permalink TEXT,
                remote_updated_at INTEGER,
                updated_at INTEGER NOT NULL,
                revision INTEGER NOT NULL DEFAULT 0,
                sync_state TEXT NOT NULL,
                state_rank INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_records_listing
                ON records (state_rank, updated_at DESC, local_id);
            CREATE INDEX IF NOT EXISTS idx_records_remote_id ON records (remote_id);
            "#,
        )
        .map_err(|e| backend("create records table failed", e))?;
        Ok(())
    }

    fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<(Record, String, String)> {
        let tags_json: String = row.get(5)?;
        let record = Record {
            local_id: row.get(0)?,
            remote_id: row.get(1)?,
            partition: row.get(2)?,
            title: row.get(3)?,
            body: row.get(4)?,
            tags: Vec::new(),
            draft: row.get::<_, i64>(6)? != 0,
            author: row.get(7)?,
            permalink: row.get(8)?,
            remote_updated_at: row.get(9)?,
            updated_at: row.get(10)?,
            revision: row.get::<_, i64>(11)? as u64,
        };
        Ok((record, tags_json, row.get(12)?))
    }

    fn decode((mut record, tags_json, state_tag): (Record, String, String)) -> Result<StoredRecord, StoreError> {
        record.tags = serde_json::from_str(&tags_json)
            .map_err(|e| backend(&format!("corrupt tags for '{}'", record.local_id), e))?;
        let state = SyncState::parse(&state_tag).ok_or_else(|| {
            StoreError::Backend(format!(
                "unknown sync state '{}' for '{}'",
                state_tag, record.local_id
            ))
        })?;
        Ok(StoredRecord::new(record, state))
    }

    /// `?,?,?` placeholder list for the state filter.
    fn placeholders(n: usize) -> String {
        vec!["?"; n].join(",")
    }
}

impl RecordStore for SqliteStore {
    fn put(&self, record: &Record, state: SyncState) -> Result<(), StoreError> {
        record.validate(state)?;
        let tags = serde_json::to_string(&record.tags).map_err(|e| backend("encode tags failed", e))?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO records (local_id, remote_id, partition_key, title, body, tags, \
             draft, author, permalink, remote_updated_at, updated_at, revision, sync_state, state_rank) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                record.local_id,
                record.remote_id,
                record.partition,
                record.title,
                record.body,
                tags,
                record.draft as i64,
                record.author,
                record.permalink,
                record.remote_updated_at,
                record.updated_at,
                record.revision as i64,
                state.as_str(),
                state.rank() as i64,
            ],
        )
        .map_err(|e| backend("sqlite put failed", e))?;

        debug!(local_id = %record.local_id, state = %state, "Record stored");
        Ok(())
    }

    fn get(&self, local_id: &str) -> Result<Option<StoredRecord>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM records WHERE local_id = ?1", SELECT_COLUMNS),
                params![local_id],
                Self::row_to_stored,
            )
            .optional()
            .map_err(|e| backend("sqlite get failed", e))?;
        row.map(Self::decode).transpose()
    }

    fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<StoredRecord>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM records WHERE remote_id = ?1 ORDER BY state_rank LIMIT 1",
                    SELECT_COLUMNS
                ),
                params![remote_id],
                Self::row_to_stored,
            )
            .optional()
            .map_err(|e| backend("sqlite find_by_remote_id failed", e))?;
        row.map(Self::decode).transpose()
    }

    fn scan_by_state(
        &self,
        states: &[SyncState],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        if states.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM records WHERE sync_state IN ({}) \
             ORDER BY state_rank ASC, updated_at DESC, local_id ASC LIMIT {} OFFSET {}",
            SELECT_COLUMNS,
            Self::placeholders(states.len()),
            limit,
            offset
        );
        let tags: Vec<&str> = states.iter().map(|s| s.as_str()).collect();

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).map_err(|e| backend("sqlite prepare failed", e))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(tags.iter()), Self::row_to_stored)
            .map_err(|e| backend("sqlite scan failed", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| backend("sqlite collect failed", e))?;

        rows.into_iter().map(Self::decode).collect()
    }

    fn list_by_state(&self, states: &[SyncState]) -> StateScan<'_> {
        StateScan::new(self, states)
    }

    fn count_by_state(&self, states: &[SyncState]) -> Result<u64, StoreError> {
        if states.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "SELECT COUNT(*) FROM records WHERE sync_state IN ({})",
            Self::placeholders(states.len())
        );
        let tags: Vec<&str> = states.iter().map(|s| s.as_str()).collect();

        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(&sql, rusqlite::params_from_iter(tags.iter()), |row| row.get(0))
            .map_err(|e| backend("sqlite count failed", e))?;
        Ok(count as u64)
    }

    fn remove(&self, local_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let removed = conn
            .execute("DELETE FROM records WHERE local_id = ?1", params![local_id])
            .map_err(|e| backend("sqlite delete failed", e))?;
        debug!(local_id = %local_id, removed, "Record removed");
        Ok(removed > 0)
    }
}
