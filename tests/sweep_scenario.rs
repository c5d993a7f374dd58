//! End-to-end sweep scenarios over the in-memory store.

use media_sweeper::storage::StorageProvider;
use media_sweeper::sweep::Sweeper;
use media_sweeper::testing::{InMemoryStore, RecordingDeleter};
use media_sweeper::watchlist::Watchlist;
use std::sync::Arc;
use std::time::Duration;

const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

fn record(message_id: i32, observed_at: i64) -> media_sweeper::storage::MediaRecord {
    media_sweeper::storage::MediaRecord {
        message_id,
        observed_at,
    }
}

#[tokio::test]
async fn sweep_deletes_only_after_delay_elapses() {
    // Chat 555 with a 900s delay; message 1 ingested at t=0
    let store = Arc::new(InMemoryStore::new());
    let watchlist = Watchlist::new(store.clone());
    watchlist
        .enable(555, "Scenario Chat", 42, 900)
        .await
        .expect("enable");
    store.append_record(555, record(1, 0)).await.expect("append");

    let deleter = Arc::new(RecordingDeleter::new());
    let sweeper = Sweeper::new(store.clone(), deleter.clone(), SWEEP_INTERVAL);

    // At t=899 nothing is expired
    let stats = sweeper.sweep_once(899).await.expect("sweep at 899");
    assert_eq!(stats.deleted, 0);
    assert_eq!(deleter.call_count().await, 0);
    assert_eq!(store.record_count(555).await, 1);

    // At t=901 the message is expired, deleted, and the ledger drains
    let stats = sweeper.sweep_once(901).await.expect("sweep at 901");
    assert_eq!(stats.deleted, 1);
    assert_eq!(deleter.call_count().await, 1);
    assert_eq!(store.record_count(555).await, 0);

    let calls = deleter.calls.lock().await;
    assert_eq!(calls[0], (555, vec![1]));
}

#[tokio::test]
async fn disable_then_list_then_sweep_ignores_chat() {
    let store = Arc::new(InMemoryStore::new());
    let watchlist = Watchlist::new(store.clone());
    watchlist.enable(555, "Doomed", 42, 10).await.expect("enable");
    store.append_record(555, record(1, 0)).await.expect("append");

    watchlist.disable(555, 42).await.expect("disable");

    // The user's index no longer contains the chat
    assert!(watchlist.list(42).await.expect("list").is_empty());

    // A sweep that would have deleted the record now has nothing to do
    let deleter = Arc::new(RecordingDeleter::new());
    let sweeper = Sweeper::new(store.clone(), deleter.clone(), SWEEP_INTERVAL);
    let stats = sweeper.sweep_once(1_000).await.expect("sweep");
    assert_eq!(stats.chats_scanned, 0);
    assert_eq!(deleter.call_count().await, 0);
}

#[tokio::test]
async fn failing_chat_accumulates_until_resolved() {
    // Bot lost admin rights in chat 1: deletes fail, ledger keeps growing,
    // then drains once deletion starts succeeding again
    let store = Arc::new(InMemoryStore::new());
    let watchlist = Watchlist::new(store.clone());
    watchlist.enable(1, "Broken", 42, 10).await.expect("enable");
    store.append_record(1, record(100, 0)).await.expect("append");

    let failing = Arc::new(RecordingDeleter::failing_for(vec![1]));
    let sweeper = Sweeper::new(store.clone(), failing.clone(), SWEEP_INTERVAL);

    sweeper.sweep_once(50).await.expect("sweep 1");
    store.append_record(1, record(101, 50)).await.expect("append");
    sweeper.sweep_once(100).await.expect("sweep 2");

    // Both records still pending; each sweep retried the full expired set
    assert_eq!(store.record_count(1).await, 2);
    assert!(failing.call_count().await >= 2);

    // Rights restored
    let healthy = Arc::new(RecordingDeleter::new());
    let sweeper = Sweeper::new(store.clone(), healthy, SWEEP_INTERVAL);
    let stats = sweeper.sweep_once(200).await.expect("sweep 3");
    assert_eq!(stats.deleted, 2);
    assert_eq!(store.record_count(1).await, 0);
}

#[tokio::test]
async fn enable_observes_effect_on_next_sweep_without_sync() {
    let store = Arc::new(InMemoryStore::new());
    let watchlist = Watchlist::new(store.clone());
    let deleter = Arc::new(RecordingDeleter::new());
    let sweeper = Sweeper::new(store.clone(), deleter.clone(), SWEEP_INTERVAL);

    // Sweep before any configuration exists
    let stats = sweeper.sweep_once(0).await.expect("sweep");
    assert_eq!(stats.chats_scanned, 0);

    // Configure between cycles; the next cycle picks it up
    watchlist.enable(7, "Late", 42, 0).await.expect("enable");
    store.append_record(7, record(1, 10)).await.expect("append");

    let stats = sweeper.sweep_once(10).await.expect("sweep");
    assert_eq!(stats.chats_scanned, 1);
    assert_eq!(stats.deleted, 1);
}
