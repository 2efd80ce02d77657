// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic offline-sync usage example.
//!
//! Demonstrates:
//! 1. Opening a queue over a SQLite file and an in-memory remote
//! 2. Saving posts while the remote is offline
//! 3. Rendering the partition listing (dirty first)
//! 4. Coming back online and letting the scheduler sync
//! 5. Edit, delete and save-and-sync
//! 6. Displaying metrics
//! 7. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=offline_sync=debug cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use offline_sync::record::parse_tags;
use offline_sync::{InMemoryRemote, Record, SyncQueue, SyncQueueConfig};
use tracing_subscriber::EnvFilter;

const DB_PATH: &str = "./offline_sync_demo.db";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("offline_sync=info")))
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           offline-sync: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Open the queue
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Opening queue...");
    let _ = std::fs::remove_file(DB_PATH);

    let config = SyncQueueConfig {
        store_path: Some(DB_PATH.into()),
        // Sync quickly for the demo
        sync_interval_ms: 500,
        ..Default::default()
    };

    let remote = Arc::new(InMemoryRemote::new().with_latency(Duration::from_millis(20)));
    let queue = SyncQueue::open(config, remote.clone()).await?;
    println!("   ✅ Queue open! Scheduler: {}", queue.scheduler_state());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Save while offline
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📴 Remote offline, saving 3 posts locally...");
    remote.set_online(false);
    remote.seed("blog-1", "Written on another device", "Shows up after the first sync");

    // Tags come in as a comma separated field, the way an editor form sends them
    let posts = [
        ("a1", "Hello", "First post", "demo, intro"),
        ("a2", "Offline first", "Written on a train", "demo,,offline "),
        ("a3", "Draft", "Not ready yet", ""),
    ];
    for (id, title, body, tag_field) in posts {
        let mut record = Record::new("blog-1", title, body)
            .with_local_id(id)
            .with_tags(parse_tags(tag_field));
        if id == "a3" {
            record = record.as_draft();
        }
        let saved = queue.save(record)?;
        println!("   └─ Saved {} → {}", saved.local_id(), saved.state);
    }

    queue.start();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    println!("   Status: {}", queue.status()?);

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Render the listing
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Listing (dirty first):");
    print_listing(&queue)?;

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Back online
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📶 Remote back online, waiting for the scheduler...");
    remote.set_online(true);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    println!("   Status: {}", queue.status()?);
    print_listing(&queue)?;

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Edit, delete, save-and-sync
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n✏️  Editing a1, deleting a2...");
    if let Some(stored) = queue.get("a1")? {
        let mut record = stored.record;
        record.title = "Hello, again".into();
        let saved = queue.save(record)?;
        println!("   └─ a1 → {}", saved.state);
    }
    let deleted = queue.delete("a2")?;
    println!("   └─ a2 → {}", deleted.state);

    let draft = Record::new("blog-1", "Published at once", "save_and_sync").with_local_id("a4");
    let (stored, outcome) = queue.save_and_sync(draft).await?;
    println!("   └─ a4 → {} ({})", stored.state, outcome);
    if let Some(remote_id) = &stored.record.remote_id {
        println!("      remote id: {}", remote_id);
    }
    print_listing(&queue)?;

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);
    let calls = remote.calls();
    println!(
        "   Remote calls: {} creates, {} updates, {} deletes, {} lists, {} probes",
        calls.creates, calls.updates, calls.deletes, calls.lists, calls.probes
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 7. Shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Stopping scheduler...");
    queue.stop();
    println!("   ✅ Stopped! Scheduler: {}", queue.scheduler_state());
    drop(queue);

    let _ = std::fs::remove_file(DB_PATH);
    let _ = std::fs::remove_file(format!("{}-shm", DB_PATH));
    let _ = std::fs::remove_file(format!("{}-wal", DB_PATH));

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

fn print_listing(queue: &SyncQueue) -> Result<(), Box<dyn std::error::Error>> {
    for stored in queue.list_partition("blog-1")? {
        let record = &stored.record;
        let visibility = if record.is_published() {
            record.permalink.as_deref().unwrap_or_default()
        } else if record.draft {
            "(draft)"
        } else {
            "(unpublished)"
        };
        println!(
            "   └─ [{:<13}] {:<4} {:<28} remote={} tags=[{}] {}",
            stored.state.to_string(),
            &record.local_id[..record.local_id.len().min(4)],
            record.title,
            record.remote_id.as_deref().unwrap_or("-"),
            record.tags.join(","),
            visibility,
        );
    }
    Ok(())
}

/// Dump all captured metrics, sorted by name
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
            let rendered = match value {
                DebugValue::Counter(v) => v.to_string(),
                DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
                DebugValue::Histogram(samples) => {
                    let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                    format!("count={} sum={:.4}", samples.len(), sum)
                }
            };
            format!("{}{} = {}", key.name(), label_str, rendered)
        })
        .collect();
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
