// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use super::traits::{RemoteError, RemoteRecord, RemoteService};
use crate::record::{now_millis, Record};

/// Call counters for [`InMemoryRemote`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteCalls {
    pub creates: u64,
    pub updates: u64,
    pub deletes: u64,
    pub lists: u64,
    pub probes: u64,
}

impl RemoteCalls {
    /// Create, update and delete calls combined.
    #[must_use]
    pub fn mutations(&self) -> u64 {
        self.creates + self.updates + self.deletes
    }
}

/// In-process remote collection.
///
/// Assigns ids `r1`, `r2`, ... and normalizes tags the way a blog service
/// would (trimmed, de-duplicated). Can be switched offline to simulate a
/// network outage, and given an artificial latency.
pub struct InMemoryRemote {
    entries: DashMap<String, (String, RemoteRecord)>,
    next_id: AtomicU64,
    online: AtomicBool,
    latency: Option<Duration>,
    author: String,
    creates: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    lists: AtomicU64,
    probes: AtomicU64,
}

impl InMemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
            online: AtomicBool::new(true),
            latency: None,
            author: "local".to_string(),
            creates: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            lists: AtomicU64::new(0),
            probes: AtomicU64::new(0),
        }
    }

    /// Start id allocation at `r{next}`.
    #[must_use]
    pub fn starting_at(self, next: u64) -> Self {
        self.next_id.store(next, Ordering::Relaxed);
        self
    }

    /// Delay every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Simulate connectivity loss or recovery.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Insert an entry directly, as if another client had created it.
    pub fn seed(&self, partition: &str, title: &str, body: &str) -> RemoteRecord {
        let remote_id = self.allocate_id();
        let entry = RemoteRecord {
            remote_id: remote_id.clone(),
            title: title.to_string(),
            body: body.to_string(),
            tags: Vec::new(),
            draft: false,
            author: Some(self.author.clone()),
            permalink: Some(Self::permalink(partition, &remote_id)),
            updated_at: now_millis(),
        };
        self.entries.insert(remote_id, (partition.to_string(), entry.clone()));
        entry
    }

    /// Remove an entry directly, as if another client had deleted it.
    pub fn forget(&self, remote_id: &str) {
        self.entries.remove(remote_id);
    }

    #[must_use]
    pub fn get(&self, remote_id: &str) -> Option<RemoteRecord> {
        self.entries.get(remote_id).map(|e| e.value().1.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn calls(&self) -> RemoteCalls {
        RemoteCalls {
            creates: self.creates.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            lists: self.lists.load(Ordering::Relaxed),
            probes: self.probes.load(Ordering::Relaxed),
        }
    }

    fn allocate_id(&self) -> String {
        format!("r{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn permalink(partition: &str, remote_id: &str) -> String {
        format!("memory://{}/{}", partition, remote_id)
    }

    fn normalize_tags(tags: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !out.iter().any(|t| t == tag) {
                out.push(tag.to_string());
            }
        }
        out
    }

    fn render(&self, partition: &str, remote_id: String, record: &Record) -> RemoteRecord {
        let permalink = (!record.draft).then(|| Self::permalink(partition, &remote_id));
        RemoteRecord {
            remote_id,
            title: record.title.clone(),
            body: record.body.clone(),
            tags: Self::normalize_tags(&record.tags),
            draft: record.draft,
            author: Some(self.author.clone()),
            permalink,
            updated_at: now_millis(),
        }
    }

    async fn round_trip(&self) -> Result<(), RemoteError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.is_online() {
            Ok(())
        } else {
            Err(RemoteError::Network("remote is offline".to_string()))
        }
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteService for InMemoryRemote {
    async fn create(&self, partition: &str, record: &Record) -> Result<RemoteRecord, RemoteError> {
        self.creates.fetch_add(1, Ordering::Relaxed);
        self.round_trip().await?;

        let remote_id = self.allocate_id();
        let entry = self.render(partition, remote_id.clone(), record);
        self.entries.insert(remote_id, (partition.to_string(), entry.clone()));
        Ok(entry)
    }

    async fn update(&self, remote_id: &str, record: &Record) -> Result<RemoteRecord, RemoteError> {
        self.updates.fetch_add(1, Ordering::Relaxed);
        self.round_trip().await?;

        let mut slot = self.entries.get_mut(remote_id).ok_or_else(|| RemoteError::Conflict {
            remote_id: remote_id.to_string(),
        })?;
        let partition = slot.0.clone();
        let entry = self.render(&partition, remote_id.to_string(), record);
        slot.1 = entry.clone();
        Ok(entry)
    }

    async fn delete(&self, remote_id: &str) -> Result<(), RemoteError> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.round_trip().await?;

        self.entries
            .remove(remote_id)
            .map(|_| ())
            .ok_or_else(|| RemoteError::Conflict {
                remote_id: remote_id.to_string(),
            })
    }

    async fn list(&self, partition: &str) -> Result<Vec<RemoteRecord>, RemoteError> {
        self.lists.fetch_add(1, Ordering::Relaxed);
        self.round_trip().await?;

        let mut entries: Vec<RemoteRecord> = self
            .entries
            .iter()
            .filter(|e| e.value().0 == partition)
            .map(|e| e.value().1.clone())
            .collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.remote_id.cmp(&b.remote_id)));
        Ok(entries)
    }

    async fn probe(&self) -> Result<(), RemoteError> {
        self.probes.fetch_add(1, Ordering::Relaxed);
        self.round_trip().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(title: &str) -> Record {
        Record::new("blog", title, "body")
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let remote = InMemoryRemote::new();
        let a = remote.create("blog", &post("a")).await.unwrap();
        let b = remote.create("blog", &post("b")).await.unwrap();
        assert_eq!(a.remote_id, "r1");
        assert_eq!(b.remote_id, "r2");
        assert_eq!(remote.len(), 2);
    }

    #[tokio::test]
    async fn test_create_normalizes_tags_and_permalink() {
        let remote = InMemoryRemote::new().with_author("bob");
        let record = post("t").with_tags([" rust", "rust", "", "sync "]);
        let created = remote.create("blog", &record).await.unwrap();

        assert_eq!(created.tags, vec!["rust", "sync"]);
        assert_eq!(created.author.as_deref(), Some("bob"));
        assert_eq!(created.permalink.as_deref(), Some("memory://blog/r1"));

        let draft = remote.create("blog", &post("d").as_draft()).await.unwrap();
        assert!(draft.permalink.is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_is_conflict() {
        let remote = InMemoryRemote::new();
        let err = remote.update("r404", &post("x")).await.unwrap_err();
        assert_eq!(err, RemoteError::Conflict { remote_id: "r404".into() });
    }

    #[tokio::test]
    async fn test_update_keeps_partition() {
        let remote = InMemoryRemote::new();
        let created = remote.create("blog-2", &post("old")).await.unwrap();
        let updated = remote.update(&created.remote_id, &post("new")).await.unwrap();

        assert_eq!(updated.title, "new");
        assert_eq!(remote.list("blog-2").await.unwrap().len(), 1);
        assert!(remote.list("blog").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let remote = InMemoryRemote::new();
        let created = remote.create("blog", &post("x")).await.unwrap();
        remote.delete(&created.remote_id).await.unwrap();
        assert!(remote.is_empty());
        assert!(remote.delete(&created.remote_id).await.is_err());
    }

    #[tokio::test]
    async fn test_offline_fails_everything_but_counts_calls() {
        let remote = InMemoryRemote::new();
        remote.set_online(false);

        assert!(matches!(remote.probe().await, Err(RemoteError::Network(_))));
        assert!(remote.create("blog", &post("x")).await.is_err());
        assert!(remote.list("blog").await.is_err());
        assert!(remote.is_empty());

        let calls = remote.calls();
        assert_eq!(calls.probes, 1);
        assert_eq!(calls.creates, 1);
        assert_eq!(calls.lists, 1);
        assert_eq!(calls.mutations(), 1);

        remote.set_online(true);
        assert!(remote.probe().await.is_ok());
    }

    #[tokio::test]
    async fn test_seed_and_forget() {
        let remote = InMemoryRemote::new();
        let seeded = remote.seed("blog", "From elsewhere", "body");
        assert_eq!(remote.get(&seeded.remote_id), Some(seeded.clone()));
        remote.forget(&seeded.remote_id);
        assert!(remote.get(&seeded.remote_id).is_none());
    }
}
