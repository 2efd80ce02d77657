// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests (fuzzing) for the sync queue.
//!
//! Uses proptest to drive the state machine and the stores with random
//! operation sequences, and to feed malformed input to the parsers.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::collections::HashMap;

use proptest::prelude::*;

use offline_sync::record::parse_tags;
use offline_sync::{MemoryStore, Record, RecordStore, Settled, SqliteStore, StoredRecord, SyncState};

// =============================================================================
// Strategies for generating test data
// =============================================================================

fn state_strategy() -> impl Strategy<Value = SyncState> {
    prop_oneof![
        Just(SyncState::Clean),
        Just(SyncState::PendingCreate),
        Just(SyncState::PendingUpdate),
        Just(SyncState::PendingDelete),
    ]
}

#[derive(Debug, Clone, Copy)]
enum Event {
    Edit,
    Delete,
    RemoteSuccess,
}

fn event_strategy() -> impl Strategy<Value = Event> {
    prop_oneof![Just(Event::Edit), Just(Event::Delete), Just(Event::RemoteSuccess)]
}

/// Store-level operation on one of a handful of ids.
#[derive(Debug, Clone)]
enum StoreOp {
    Put { id: u8, state: SyncState, updated_at: i64 },
    Remove { id: u8 },
}

fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        3 => (0u8..12, state_strategy(), 0i64..20).prop_map(|(id, state, updated_at)| StoreOp::Put {
            id,
            state,
            updated_at,
        }),
        1 => (0u8..12).prop_map(|id| StoreOp::Remove { id }),
    ]
}

fn record_for(id: u8, state: SyncState, updated_at: i64) -> Record {
    let mut record = Record::new(format!("blog-{}", id % 3), format!("post {}", id), "body")
        .with_local_id(format!("p{:02}", id));
    if state == SyncState::PendingUpdate || (state == SyncState::Clean && id % 2 == 0) {
        record = record.with_remote_id(format!("r{}", id));
    }
    record.updated_at = updated_at;
    record
}

fn apply_ops(store: &dyn RecordStore, ops: &[StoreOp]) {
    for op in ops {
        match op {
            StoreOp::Put { id, state, updated_at } => {
                store.put(&record_for(*id, *state, *updated_at), *state).unwrap();
            }
            StoreOp::Remove { id } => {
                store.remove(&format!("p{:02}", id)).unwrap();
            }
        }
    }
}

fn assert_listing_order(records: &[StoredRecord]) -> Result<(), TestCaseError> {
    for pair in records.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        prop_assert!(a.state.rank() <= b.state.rank(), "dirty records must come first");
        if a.state.rank() == b.state.rank() {
            prop_assert!(a.record.updated_at >= b.record.updated_at, "newest edit first");
            if a.record.updated_at == b.record.updated_at {
                prop_assert!(a.record.local_id < b.record.local_id, "ties broken by local id");
            }
        }
    }
    Ok(())
}

// =============================================================================
// State Machine Properties
// =============================================================================

proptest! {
    /// Once deleted, a record stays pending deletion until the remote
    /// confirms, whatever edits follow.
    #[test]
    fn prop_delete_is_sticky(start in state_strategy(), events in prop::collection::vec(event_strategy(), 0..30)) {
        let mut state = Some(start);
        let mut deleted = false;

        for event in events {
            let Some(current) = state else { break };
            state = match event {
                Event::Edit => Some(current.on_edit()),
                Event::Delete => {
                    deleted = true;
                    Some(current.on_delete())
                }
                Event::RemoteSuccess => match current.on_remote_success() {
                    Settled::Keep(next) => Some(next),
                    Settled::Remove => None,
                },
            };
            if deleted {
                if let Some(s) = state {
                    prop_assert_eq!(s, SyncState::PendingDelete);
                }
            }
        }
    }

    /// An edit never makes a record clean, and never moves it off a pending
    /// delete.
    #[test]
    fn prop_edit_keeps_record_dirty(state in state_strategy()) {
        let edited = state.on_edit();
        prop_assert!(edited.is_dirty());
        if state == SyncState::PendingDelete {
            prop_assert_eq!(edited, SyncState::PendingDelete);
        }
    }

    /// A confirmed operation only ever settles to clean or removal.
    #[test]
    fn prop_remote_success_settles(state in state_strategy()) {
        match state.on_remote_success() {
            Settled::Keep(next) => prop_assert_eq!(next, SyncState::Clean),
            Settled::Remove => prop_assert_eq!(state, SyncState::PendingDelete),
        }
    }
}

// =============================================================================
// Store Invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Random put/remove sequences: one entry per local id, listings in
    /// order, and counts agreeing with the listing.
    #[test]
    fn prop_memory_store_invariants(ops in prop::collection::vec(store_op_strategy(), 0..60)) {
        let store = MemoryStore::new();
        apply_ops(&store, &ops);

        // Expected final state per id
        let mut expected: HashMap<String, SyncState> = HashMap::new();
        for op in &ops {
            match op {
                StoreOp::Put { id, state, .. } => {
                    expected.insert(format!("p{:02}", id), *state);
                }
                StoreOp::Remove { id } => {
                    expected.remove(&format!("p{:02}", id));
                }
            }
        }

        let all = store.list_by_state(&SyncState::ALL).with_page_size(5).collect_records().unwrap();
        prop_assert_eq!(all.len(), expected.len());
        for stored in &all {
            prop_assert_eq!(expected.get(stored.local_id()), Some(&stored.state));
        }
        assert_listing_order(&all)?;

        let dirty = store.count_by_state(&SyncState::DIRTY).unwrap();
        let expected_dirty = expected.values().filter(|s| s.is_dirty()).count() as u64;
        prop_assert_eq!(dirty, expected_dirty);
    }

    /// Both stores list the same records in the same order.
    #[test]
    fn prop_sqlite_matches_memory(ops in prop::collection::vec(store_op_strategy(), 0..40)) {
        let memory = MemoryStore::new();
        let sqlite = SqliteStore::open_in_memory().unwrap();
        apply_ops(&memory, &ops);
        apply_ops(&sqlite, &ops);

        for states in [&SyncState::ALL[..], &SyncState::DIRTY[..], &[SyncState::Clean][..]] {
            let from_memory = memory.list_by_state(states).with_page_size(3).collect_records().unwrap();
            let from_sqlite = sqlite.list_by_state(states).with_page_size(3).collect_records().unwrap();
            prop_assert_eq!(from_memory, from_sqlite);
        }
    }

    /// The store refuses a pending update without a remote id, and leaves
    /// any previous copy untouched.
    #[test]
    fn prop_store_rejects_invalid(id in 0u8..12) {
        let store = MemoryStore::new();
        let record = record_for(id, SyncState::PendingCreate, 1);
        store.put(&record, SyncState::PendingCreate).unwrap();

        let mut orphan = record.clone();
        orphan.remote_id = None;
        orphan.title = "changed".into();
        prop_assert!(store.put(&orphan, SyncState::PendingUpdate).is_err());

        let stored = store.get(&record.local_id).unwrap().unwrap();
        prop_assert_eq!(stored.state, SyncState::PendingCreate);
        prop_assert_eq!(stored.record.title, record.title);
    }
}

// =============================================================================
// Input Parsing Fuzz Tests
// =============================================================================

proptest! {
    /// Tag parsing never panics and never yields blank or comma-bearing tags.
    #[test]
    fn fuzz_parse_tags(raw in ".*") {
        for tag in parse_tags(&raw) {
            prop_assert!(!tag.is_empty());
            prop_assert_eq!(tag.trim(), tag.as_str());
            prop_assert!(!tag.contains(','));
        }
    }

    /// Record deserialization should never panic on arbitrary bytes
    #[test]
    fn fuzz_record_from_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..2000)) {
        let _ = serde_json::from_slice::<Record>(&bytes);
        let _ = serde_json::from_slice::<StoredRecord>(&bytes);
    }

    /// Serialized records survive arbitrary corruption without panicking
    #[test]
    fn fuzz_corrupted_record(
        id in 0u8..12,
        corruption in prop::collection::vec(any::<u8>(), 1..50),
        position in 0usize..10000,
    ) {
        let record = record_for(id, SyncState::PendingCreate, 7).with_tags(["rust", "sync"]);
        let mut bytes = serde_json::to_vec(&record).unwrap();
        let pos = position % bytes.len();
        for (i, b) in corruption.iter().enumerate() {
            let idx = (pos + i) % bytes.len();
            bytes[idx] ^= b;
        }
        let _ = serde_json::from_slice::<Record>(&bytes);
    }
}
