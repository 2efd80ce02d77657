// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::Record;

/// Failure of a remote operation.
///
/// Every kind is retried by the next sync pass. A conflict (the remote no
/// longer knows the referenced identifier, or rejects it as stale) is not
/// merged; the record just stays dirty.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote unreachable: {0}")]
    Network(String),
    #[error("Remote rejected the request: {0}")]
    Rejected(String),
    #[error("Stale or unknown remote id '{remote_id}'")]
    Conflict { remote_id: String },
}

impl RemoteError {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Rejected(_) => "rejected",
            Self::Conflict { .. } => "conflict",
        }
    }
}

/// A record as the remote service returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub remote_id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    /// Remote modification time (epoch millis)
    pub updated_at: i64,
}

/// The remote collection the queue reconciles against.
///
/// Implementations wrap whatever client talks to the real service. The queue
/// issues at most one call per dirty record per pass and never retries inside
/// a pass.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Create `record` in the collection identified by `partition`.
    async fn create(&self, partition: &str, record: &Record) -> Result<RemoteRecord, RemoteError>;

    /// Replace the remote entry `remote_id` with `record`'s content.
    async fn update(&self, remote_id: &str, record: &Record) -> Result<RemoteRecord, RemoteError>;

    async fn delete(&self, remote_id: &str) -> Result<(), RemoteError>;

    /// Full listing of one collection.
    async fn list(&self, partition: &str) -> Result<Vec<RemoteRecord>, RemoteError>;

    /// Cheap reachability check, run once before each pass.
    /// Default implementation assumes the remote is reachable.
    async fn probe(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}
