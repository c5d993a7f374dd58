//! Periodic sweep of the deletion ledger.
//!
//! The sweeper wakes on a fixed cadence, partitions every watched chat's
//! records into expired and kept, hands expired ids to the batched deleter,
//! and then removes only the ids the deleter confirmed from the store.
//! Records whose deletion failed stay in the ledger and are retried on a
//! later cycle. A failure in one chat never aborts the rest of the cycle,
//! and an unexpected cycle-level error degrades to a skipped cycle.

pub mod deleter;

use crate::storage::{ChatLedger, StorageError, StorageProvider};
use chrono::Utc;
use deleter::{delete_in_batches, MessageDeleter};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Counters for one sweep cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Watched chats scanned
    pub chats_scanned: usize,
    /// Messages confirmed deleted
    pub deleted: usize,
    /// Messages whose delete failed and were left pending
    pub requeued: usize,
}

/// Message ids in `ledger` whose age has reached the chat's delay.
///
/// A record is expired when `now - observed_at >= delete_after_secs`;
/// the boundary itself counts as expired.
#[must_use]
pub fn expired_ids(ledger: &ChatLedger, now: i64) -> Vec<i32> {
    ledger
        .records
        .iter()
        .filter(|r| now - r.observed_at >= ledger.delete_after_secs)
        .map(|r| r.message_id)
        .collect()
}

/// Background scheduler driving the scan-and-delete cycle
pub struct Sweeper {
    store: Arc<dyn StorageProvider>,
    deleter: Arc<dyn MessageDeleter>,
    interval: Duration,
}

impl Sweeper {
    /// Create a sweeper over the given store and deleter
    #[must_use]
    pub fn new(
        store: Arc<dyn StorageProvider>,
        deleter: Arc<dyn MessageDeleter>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            deleter,
            interval,
        }
    }

    /// Run the sweep loop forever.
    ///
    /// Errors never escape: a failed cycle is logged and the next tick
    /// proceeds normally.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Sweep scheduler started (interval: {:?})", self.interval);

        loop {
            ticker.tick().await;
            let now = Utc::now().timestamp();
            match self.sweep_once(now).await {
                Ok(stats) if stats.deleted > 0 || stats.requeued > 0 => {
                    info!(
                        "Sweep: {} chat(s), {} deleted, {} requeued",
                        stats.chats_scanned, stats.deleted, stats.requeued
                    );
                }
                Ok(stats) => {
                    debug!("Sweep: {} chat(s), nothing expired", stats.chats_scanned);
                }
                Err(e) => warn!("Sweep cycle skipped: {}", e),
            }
        }
    }

    /// Execute a single sweep cycle at the given wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns an error only when the ledger listing itself fails; per-chat
    /// failures are logged and the remaining chats still run.
    pub async fn sweep_once(&self, now: i64) -> Result<SweepStats, StorageError> {
        let ledgers = self.store.list_ledgers().await?;
        let mut stats = SweepStats {
            chats_scanned: ledgers.len(),
            ..SweepStats::default()
        };

        for ledger in &ledgers {
            match self.sweep_chat(ledger, now).await {
                Ok((deleted, requeued)) => {
                    stats.deleted += deleted;
                    stats.requeued += requeued;
                }
                Err(e) => warn!("Sweep failed for chat {}: {}", ledger.chat_id, e),
            }
        }

        Ok(stats)
    }

    /// Sweep one chat: delete its expired records and remove confirmed ids.
    ///
    /// Only ids the deleter confirmed are removed, so records ingested while
    /// the delete calls were in flight survive the cycle. Idle chats incur
    /// no writes.
    async fn sweep_chat(
        &self,
        ledger: &ChatLedger,
        now: i64,
    ) -> Result<(usize, usize), StorageError> {
        let expired = expired_ids(ledger, now);
        if expired.is_empty() {
            return Ok((0, 0));
        }

        let report = delete_in_batches(self.deleter.as_ref(), ledger.chat_id, &expired).await;
        if !report.deleted.is_empty() {
            self.store
                .remove_records(ledger.chat_id, &report.deleted)
                .await?;
        }

        Ok((report.deleted.len(), report.failed.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MediaRecord;
    use crate::testing::{InMemoryStore, RecordingDeleter};
    use proptest::prelude::*;

    fn ledger_with(chat_id: i64, delay: i64, records: &[(i32, i64)]) -> ChatLedger {
        ChatLedger {
            chat_id,
            delete_after_secs: delay,
            records: records
                .iter()
                .map(|&(message_id, observed_at)| MediaRecord {
                    message_id,
                    observed_at,
                })
                .collect(),
        }
    }

    async fn store_with(ledger: ChatLedger) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.save_ledger(&ledger).await.expect("save ledger");
        store
    }

    #[test]
    fn test_expired_boundary_is_inclusive() {
        let ledger = ledger_with(555, 900, &[(1, 0)]);
        assert!(expired_ids(&ledger, 899).is_empty());
        assert_eq!(expired_ids(&ledger, 900), vec![1]);
        assert_eq!(expired_ids(&ledger, 901), vec![1]);
    }

    #[tokio::test]
    async fn test_successful_delete_removes_records() {
        let store = store_with(ledger_with(555, 900, &[(1, 0), (2, 500)])).await;
        let deleter = Arc::new(RecordingDeleter::new());
        let sweeper = Sweeper::new(store.clone(), deleter.clone(), Duration::from_secs(10));

        let stats = sweeper.sweep_once(901).await.expect("sweep");
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.requeued, 0);

        // Message 1 gone, message 2 (age 401) kept
        let ledger = store.load_ledger(555).await.expect("load").expect("ledger");
        assert_eq!(ledger.records.len(), 1);
        assert_eq!(ledger.records[0].message_id, 2);
    }

    #[tokio::test]
    async fn test_failed_delete_retains_records() {
        let store = store_with(ledger_with(555, 900, &[(1, 0)])).await;
        let deleter = Arc::new(RecordingDeleter::failing_for(vec![555]));
        let sweeper = Sweeper::new(store.clone(), deleter, Duration::from_secs(10));

        let stats = sweeper.sweep_once(901).await.expect("sweep");
        assert_eq!(stats.deleted, 0);
        assert_eq!(stats.requeued, 1);
        assert_eq!(store.record_count(555).await, 1);
    }

    #[tokio::test]
    async fn test_second_sweep_is_idempotent() {
        let store = store_with(ledger_with(555, 900, &[(1, 0), (2, 1)])).await;
        let deleter = Arc::new(RecordingDeleter::new());
        let sweeper = Sweeper::new(store.clone(), deleter.clone(), Duration::from_secs(10));

        sweeper.sweep_once(2_000).await.expect("first sweep");
        assert_eq!(deleter.call_count().await, 1);

        // Nothing pending: no further delete calls
        let stats = sweeper.sweep_once(2_010).await.expect("second sweep");
        assert_eq!(stats.deleted, 0);
        assert_eq!(deleter.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_one_failing_chat_does_not_block_others() {
        let store = Arc::new(InMemoryStore::new());
        store
            .save_ledger(&ledger_with(1, 10, &[(100, 0)]))
            .await
            .expect("save");
        store
            .save_ledger(&ledger_with(2, 10, &[(200, 0)]))
            .await
            .expect("save");

        let deleter = Arc::new(RecordingDeleter::failing_for(vec![1]));
        let sweeper = Sweeper::new(store.clone(), deleter, Duration::from_secs(10));

        let stats = sweeper.sweep_once(100).await.expect("sweep");
        assert_eq!(stats.chats_scanned, 2);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.requeued, 1);
        assert_eq!(store.record_count(1).await, 1);
        assert_eq!(store.record_count(2).await, 0);
    }

    #[tokio::test]
    async fn test_idle_chat_issues_no_calls() {
        let store = store_with(ledger_with(555, 900, &[(1, 890)])).await;
        let deleter = Arc::new(RecordingDeleter::new());
        let sweeper = Sweeper::new(store, deleter.clone(), Duration::from_secs(10));

        let stats = sweeper.sweep_once(900).await.expect("sweep");
        assert_eq!(stats.deleted, 0);
        assert_eq!(deleter.call_count().await, 0);
    }

    /// Deleter that ingests a new record into the same chat while the delete
    /// call is in flight, mimicking a message arriving mid-sweep.
    struct IngestingDeleter {
        store: Arc<InMemoryStore>,
        mid_sweep_record: MediaRecord,
    }

    #[async_trait::async_trait]
    impl MessageDeleter for IngestingDeleter {
        async fn delete_batch(
            &self,
            chat_id: i64,
            _message_ids: &[i32],
        ) -> Result<(), deleter::DeleteError> {
            self.store
                .append_record(chat_id, self.mid_sweep_record)
                .await
                .expect("append mid-sweep");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_record_ingested_mid_sweep_survives() {
        let store = store_with(ledger_with(555, 900, &[(1, 0)])).await;
        let deleter = Arc::new(IngestingDeleter {
            store: store.clone(),
            mid_sweep_record: MediaRecord {
                message_id: 99,
                observed_at: 901,
            },
        });
        let sweeper = Sweeper::new(store.clone(), deleter, Duration::from_secs(10));

        sweeper.sweep_once(901).await.expect("sweep");

        let ledger = store.load_ledger(555).await.expect("load").expect("ledger");
        assert_eq!(ledger.records.len(), 1);
        assert_eq!(ledger.records[0].message_id, 99);
    }

    #[tokio::test]
    async fn test_listing_failure_skips_cycle() {
        let mut store = crate::storage::MockStorageProvider::new();
        store
            .expect_list_ledgers()
            .returning(|| Err(StorageError::Config("bucket unreachable".to_string())));

        let deleter = Arc::new(RecordingDeleter::new());
        let sweeper = Sweeper::new(Arc::new(store), deleter, Duration::from_secs(10));

        assert!(sweeper.sweep_once(1_000).await.is_err());
    }

    #[tokio::test]
    async fn test_store_failure_for_one_chat_does_not_abort_sweep() {
        let mut store = crate::storage::MockStorageProvider::new();
        store.expect_list_ledgers().returning(|| {
            Ok(vec![
                ChatLedger {
                    chat_id: 1,
                    delete_after_secs: 10,
                    records: vec![MediaRecord {
                        message_id: 100,
                        observed_at: 0,
                    }],
                },
                ChatLedger {
                    chat_id: 2,
                    delete_after_secs: 10,
                    records: vec![MediaRecord {
                        message_id: 200,
                        observed_at: 0,
                    }],
                },
            ])
        });
        store
            .expect_remove_records()
            .withf(|&chat_id, _| chat_id == 1)
            .returning(|_, _| Err(StorageError::Config("write failed".to_string())));
        store
            .expect_remove_records()
            .withf(|&chat_id, ids| chat_id == 2 && ids == [200])
            .times(1)
            .returning(|_, _| Ok(()));

        let deleter = Arc::new(RecordingDeleter::new());
        let sweeper = Sweeper::new(Arc::new(store), deleter, Duration::from_secs(10));

        let stats = sweeper.sweep_once(100).await.expect("sweep");
        assert_eq!(stats.chats_scanned, 2);
        // Chat 2 still completed despite chat 1's store failure
        assert_eq!(stats.deleted, 1);
    }

    proptest! {
        #[test]
        fn prop_expired_ids_match_threshold(
            delay in 0i64..100_000,
            now in 0i64..2_000_000,
            observed in proptest::collection::vec((0i32..10_000, 0i64..1_000_000), 0..50),
        ) {
            let ledger = ledger_with(1, delay, &observed);
            let expired = expired_ids(&ledger, now);
            let want: Vec<i32> = ledger
                .records
                .iter()
                .filter(|r| now - r.observed_at >= delay)
                .map(|r| r.message_id)
                .collect();
            prop_assert_eq!(expired, want);
        }
    }
}
