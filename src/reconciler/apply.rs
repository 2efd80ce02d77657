// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Applying remote responses back to the store.
//!
//! A response was produced from the record as it looked when the pass read
//! it. Before writing, the current copy is re-read and its `revision`
//! compared with the one that was sent; the caller holds the queue's write
//! lock so no save can interleave between the read and the write.

use tracing::{debug, warn};

use crate::record::StoredRecord;
use crate::storage::{RecordStore, StoreError};
use crate::sync_state::{Settled, SyncState};
use super::types::{Applied, OpResponse};

pub(crate) fn apply_success(
    store: &dyn RecordStore,
    sent: &StoredRecord,
    response: OpResponse,
) -> Result<Applied, StoreError> {
    let local_id = sent.local_id();

    if let OpResponse::Deleted = response {
        // A pending delete cannot be edited back into anything else.
        store.remove(local_id)?;
        return Ok(Applied::Deleted);
    }

    let Some(current) = store.get(local_id)? else {
        warn!(local_id = %local_id, "Record vanished while its operation was in flight");
        return Ok(Applied::Superseded);
    };
    let unchanged = current.record.revision == sent.record.revision;

    match response {
        OpResponse::Created(remote) => {
            let mut record = current.record;
            record.remote_id = Some(remote.remote_id.clone());

            if unchanged {
                record.apply_remote(&remote);
                let state = settle(sent.state);
                store.put(&record, state)?;
                return Ok(Applied::Created);
            }

            // Edited meanwhile: keep the user's content, but never lose the
            // id or the next pass would create a duplicate.
            record.author = remote.author.clone();
            record.permalink = remote.permalink.clone();
            record.remote_updated_at = Some(remote.updated_at);
            let state = match current.state {
                SyncState::PendingDelete => SyncState::PendingDelete,
                _ => SyncState::PendingUpdate,
            };
            debug!(local_id = %local_id, remote_id = %remote.remote_id, state = %state, "Created record was edited in flight");
            store.put(&record, state)?;
            Ok(Applied::CreatedStillDirty)
        }
        OpResponse::Updated(remote) => {
            if !unchanged {
                debug!(local_id = %local_id, "Updated record was edited in flight, keeping local changes");
                return Ok(Applied::Superseded);
            }
            let mut record = current.record;
            record.apply_remote(&remote);
            store.put(&record, settle(sent.state))?;
            Ok(Applied::Updated)
        }
        OpResponse::Deleted => Ok(Applied::Deleted),
    }
}

fn settle(state: SyncState) -> SyncState {
    match state.on_remote_success() {
        Settled::Keep(next) => next,
        Settled::Remove => SyncState::Clean,
    }
}

/// Remove a tombstone whose record never reached the remote.
///
/// Returns `false` when the record changed since it was read (it was re-saved
/// or already removed).
pub(crate) fn drop_tombstone(store: &dyn RecordStore, sent: &StoredRecord) -> Result<bool, StoreError> {
    match store.get(sent.local_id())? {
        Some(current)
            if current.state == SyncState::PendingDelete && current.record.remote_id.is_none() =>
        {
            store.remove(sent.local_id())
        }
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::remote::RemoteRecord;
    use crate::storage::MemoryStore;

    fn remote(id: &str) -> RemoteRecord {
        RemoteRecord {
            remote_id: id.into(),
            title: "Hello".into(),
            body: "b".into(),
            tags: vec!["x".into()],
            draft: false,
            author: Some("me".into()),
            permalink: Some(format!("https://x/{}", id)),
            updated_at: 99,
        }
    }

    fn seeded(state: SyncState, remote_id: Option<&str>) -> (MemoryStore, StoredRecord) {
        let store = MemoryStore::new();
        let mut record = Record::new("blog", "Hello", "b").with_local_id("a1");
        record.remote_id = remote_id.map(String::from);
        record.revision = 1;
        store.put(&record, state).unwrap();
        let sent = store.get("a1").unwrap().unwrap();
        (store, sent)
    }

    fn edit(store: &MemoryStore) {
        let mut current = store.get("a1").unwrap().unwrap();
        current.record.title = "Edited".into();
        current.record.revision += 1;
        store.put(&current.record, current.state.on_edit()).unwrap();
    }

    #[test]
    fn test_create_success_attaches_id() {
        let (store, sent) = seeded(SyncState::PendingCreate, None);
        let applied = apply_success(&store, &sent, OpResponse::Created(remote("r9"))).unwrap();

        assert_eq!(applied, Applied::Created);
        let stored = store.get("a1").unwrap().unwrap();
        assert_eq!(stored.state, SyncState::Clean);
        assert_eq!(stored.record.remote_id.as_deref(), Some("r9"));
        assert_eq!(stored.record.tags, vec!["x"]);
        assert_eq!(stored.record.remote_updated_at, Some(99));
    }

    #[test]
    fn test_create_with_edit_in_flight_becomes_update() {
        let (store, sent) = seeded(SyncState::PendingCreate, None);
        edit(&store);

        let applied = apply_success(&store, &sent, OpResponse::Created(remote("r9"))).unwrap();
        assert_eq!(applied, Applied::CreatedStillDirty);

        let stored = store.get("a1").unwrap().unwrap();
        assert_eq!(stored.state, SyncState::PendingUpdate);
        assert_eq!(stored.record.remote_id.as_deref(), Some("r9"));
        assert_eq!(stored.record.title, "Edited");
        assert!(stored.record.tags.is_empty());
    }

    #[test]
    fn test_create_with_delete_in_flight_stays_deleted() {
        let (store, sent) = seeded(SyncState::PendingCreate, None);
        let mut current = store.get("a1").unwrap().unwrap();
        current.record.revision += 1;
        store.put(&current.record, SyncState::PendingDelete).unwrap();

        apply_success(&store, &sent, OpResponse::Created(remote("r9"))).unwrap();
        let stored = store.get("a1").unwrap().unwrap();
        assert_eq!(stored.state, SyncState::PendingDelete);
        assert_eq!(stored.record.remote_id.as_deref(), Some("r9"));
    }

    #[test]
    fn test_update_with_edit_in_flight_is_untouched() {
        let (store, sent) = seeded(SyncState::PendingUpdate, Some("r1"));
        edit(&store);
        let before = store.get("a1").unwrap().unwrap();

        let applied = apply_success(&store, &sent, OpResponse::Updated(remote("r1"))).unwrap();
        assert_eq!(applied, Applied::Superseded);
        assert_eq!(store.get("a1").unwrap().unwrap(), before);
    }

    #[test]
    fn test_update_success_refreshes_mirrored_fields() {
        let (store, sent) = seeded(SyncState::PendingUpdate, Some("r1"));
        apply_success(&store, &sent, OpResponse::Updated(remote("r1"))).unwrap();

        let stored = store.get("a1").unwrap().unwrap();
        assert_eq!(stored.state, SyncState::Clean);
        assert_eq!(stored.record.permalink.as_deref(), Some("https://x/r1"));
    }

    #[test]
    fn test_delete_success_removes() {
        let (store, sent) = seeded(SyncState::PendingDelete, Some("r1"));
        assert_eq!(apply_success(&store, &sent, OpResponse::Deleted).unwrap(), Applied::Deleted);
        assert!(store.get("a1").unwrap().is_none());
    }

    #[test]
    fn test_vanished_record_is_superseded() {
        let (store, sent) = seeded(SyncState::PendingCreate, None);
        store.remove("a1").unwrap();
        let applied = apply_success(&store, &sent, OpResponse::Created(remote("r9"))).unwrap();
        assert_eq!(applied, Applied::Superseded);
        assert!(store.is_empty());
    }

    #[test]
    fn test_drop_tombstone() {
        let (store, sent) = seeded(SyncState::PendingDelete, None);
        assert!(drop_tombstone(&store, &sent).unwrap());
        assert!(!drop_tombstone(&store, &sent).unwrap());
    }
}
