// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record data structure.
//!
//! A [`Record`] is the unit the queue syncs: a post with a stable local
//! identifier, an optional remote identifier (assigned by the remote on the
//! first successful create), a partition key, and string content fields.
//!
//! # Example
//!
//! ```
//! use offline_sync::{Record, SyncState};
//!
//! let record = Record::new("blog-1", "Hello", "First post")
//!     .with_local_id("a1")
//!     .with_tags(["intro", "meta"]);
//!
//! assert_eq!(record.local_id, "a1");
//! assert!(record.remote_id.is_none());
//! assert!(record.validate(SyncState::PendingCreate).is_ok());
//! assert!(record.validate(SyncState::PendingUpdate).is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::RemoteRecord;
use crate::sync_state::SyncState;

/// A record rejected at the store boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Record '{local_id}' has neither title nor body")]
    EmptyContent { local_id: String },
    #[error("Record '{local_id}' cannot be {state} without a remote id")]
    RemoteIdRequired { local_id: String, state: SyncState },
}

/// A locally stored post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Stable local identifier
    pub local_id: String,
    /// Identifier assigned by the remote on first create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// Owning collection (e.g. the target blog)
    pub partition: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Save as draft instead of publishing
    #[serde(default)]
    pub draft: bool,
    /// Mirrored from the remote
    #[serde(default)]
    pub author: Option<String>,
    /// Public URL, mirrored from the remote (absent for drafts)
    #[serde(default)]
    pub permalink: Option<String>,
    /// Remote modification time (epoch millis)
    #[serde(default)]
    pub remote_updated_at: Option<i64>,
    /// Last local edit (epoch millis)
    pub updated_at: i64,
    /// Local edit counter, bumped on every save
    #[serde(default)]
    pub revision: u64,
}

/// A record together with its sync state, as held by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub record: Record,
    pub state: SyncState,
}

impl StoredRecord {
    pub fn new(record: Record, state: SyncState) -> Self {
        Self { record, state }
    }

    #[must_use]
    pub fn local_id(&self) -> &str {
        &self.record.local_id
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state.is_dirty()
    }
}

impl Record {
    /// Create a new record with a random local id.
    pub fn new(partition: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            local_id: uuid::Uuid::new_v4().to_string(),
            remote_id: None,
            partition: partition.into(),
            title: title.into(),
            body: body.into(),
            tags: Vec::new(),
            draft: false,
            author: None,
            permalink: None,
            remote_updated_at: None,
            updated_at: now_millis(),
            revision: 0,
        }
    }

    /// Build a clean local copy of a remote entry.
    pub fn from_remote(partition: impl Into<String>, remote: &RemoteRecord) -> Self {
        let mut record = Self::new(partition, remote.title.clone(), remote.body.clone());
        record.remote_id = Some(remote.remote_id.clone());
        record.draft = remote.draft;
        record.apply_remote(remote);
        record
    }

    #[must_use]
    pub fn with_local_id(mut self, local_id: impl Into<String>) -> Self {
        self.local_id = local_id.into();
        self
    }

    #[must_use]
    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }

    #[must_use]
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn as_draft(mut self) -> Self {
        self.draft = true;
        self
    }

    /// Check required fields and the remote-id invariant for `state`.
    pub fn validate(&self, state: SyncState) -> Result<(), ValidationError> {
        if self.local_id.trim().is_empty() {
            return Err(ValidationError::MissingField("local_id"));
        }
        if self.partition.trim().is_empty() {
            return Err(ValidationError::MissingField("partition"));
        }
        if self.title.trim().is_empty() && self.body.trim().is_empty() {
            return Err(ValidationError::EmptyContent {
                local_id: self.local_id.clone(),
            });
        }
        if state == SyncState::PendingUpdate && self.remote_id.is_none() {
            return Err(ValidationError::RemoteIdRequired {
                local_id: self.local_id.clone(),
                state,
            });
        }
        Ok(())
    }

    /// Refresh the remote-derived fields from a remote response.
    ///
    /// Content the user typed (title, body) is left alone; the remote's
    /// normalized categories and timestamps are mirrored.
    pub fn apply_remote(&mut self, remote: &RemoteRecord) {
        self.tags = remote.tags.clone();
        self.author = remote.author.clone();
        self.permalink = remote.permalink.clone();
        self.remote_updated_at = Some(remote.updated_at);
    }

    /// Overwrite content and mirrored fields with a remote listing entry.
    pub(crate) fn replace_from_remote(&mut self, remote: &RemoteRecord) {
        self.title = remote.title.clone();
        self.body = remote.body.clone();
        self.draft = remote.draft;
        self.apply_remote(remote);
    }

    /// Whether the record has a public URL (published and synced).
    #[must_use]
    pub fn is_published(&self) -> bool {
        !self.draft && self.permalink.is_some()
    }
}

/// Split a comma separated tag field, dropping blanks.
///
/// ```
/// use offline_sync::record::parse_tags;
///
/// assert_eq!(parse_tags("rust, sync,, offline "), vec!["rust", "sync", "offline"]);
/// ```
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
