//! Batched message deletion against the Telegram Bot API.
//!
//! Expired message ids are chunked into batches of
//! [`DELETE_BATCH_SIZE`](crate::config::DELETE_BATCH_SIZE) and issued one
//! `deleteMessages` call per batch. A failed batch is reported back to the
//! sweep, which leaves its ids in the ledger for a later cycle; ids are never
//! silently lost.

use crate::config::DELETE_BATCH_SIZE;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while deleting a batch of messages
#[derive(Error, Debug)]
pub enum DeleteError {
    /// Telegram API rejected the call (network, rate limit, permissions)
    #[error("Telegram delete error: {0}")]
    Api(String),
}

/// Interface for issuing a single batched delete call
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageDeleter: Send + Sync {
    /// Delete up to [`crate::config::DELETE_BATCH_SIZE`] messages in one call
    async fn delete_batch(&self, chat_id: i64, message_ids: &[i32]) -> Result<(), DeleteError>;
}

/// Result of deleting one chat's expired set
#[derive(Debug, Default, Clone)]
pub struct DeleteReport {
    /// Ids confirmed deleted by the API
    pub deleted: Vec<i32>,
    /// Ids whose batch failed; they stay pending for the next sweep
    pub failed: Vec<i32>,
}

/// Delete the given ids for one chat, batch by batch.
///
/// Batches are issued sequentially; ordering within a chat does not matter.
/// A batch failure does not stop the remaining batches.
pub async fn delete_in_batches(
    deleter: &dyn MessageDeleter,
    chat_id: i64,
    message_ids: &[i32],
) -> DeleteReport {
    let mut report = DeleteReport::default();

    for batch in message_ids.chunks(DELETE_BATCH_SIZE) {
        match deleter.delete_batch(chat_id, batch).await {
            Ok(()) => report.deleted.extend_from_slice(batch),
            Err(e) => {
                warn!(
                    "Delete batch of {} failed for chat {}: {}; requeueing",
                    batch.len(),
                    chat_id,
                    e
                );
                report.failed.extend_from_slice(batch);
            }
        }
    }

    if !report.deleted.is_empty() {
        debug!(
            "Deleted {} message(s) in chat {} ({} requeued)",
            report.deleted.len(),
            chat_id,
            report.failed.len()
        );
    }

    report
}

/// Deleter backed by the live Bot API, with retry on transient failures
pub struct TelegramDeleter {
    bot: Bot,
}

impl TelegramDeleter {
    /// Wrap a bot handle
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MessageDeleter for TelegramDeleter {
    async fn delete_batch(&self, chat_id: i64, message_ids: &[i32]) -> Result<(), DeleteError> {
        let ids: Vec<MessageId> = message_ids.iter().map(|id| MessageId(*id)).collect();

        crate::utils::retry_telegram_operation(|| {
            let ids = ids.clone();
            async move {
                self.bot
                    .delete_messages(ChatId(chat_id), ids)
                    .await
                    .map_err(|e| anyhow::anyhow!("deleteMessages failed: {e}"))
            }
        })
        .await
        .map(|_| ())
        .map_err(|e| DeleteError::Api(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_batch_sizing_250_ids_three_calls() {
        let ids: Vec<i32> = (1..=250).collect();
        let mut mock = MockMessageDeleter::new();

        mock.expect_delete_batch()
            .withf(|&chat, batch| chat == 555 && batch.len() == 100)
            .times(2)
            .returning(|_, _| Ok(()));
        mock.expect_delete_batch()
            .withf(|&chat, batch| chat == 555 && batch.len() == 50)
            .times(1)
            .returning(|_, _| Ok(()));

        let report = delete_in_batches(&mock, 555, &ids).await;
        assert_eq!(report.deleted.len(), 250);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_is_requeued_not_lost() {
        let ids: Vec<i32> = (1..=150).collect();
        let mut mock = MockMessageDeleter::new();

        // First batch (100 ids) succeeds, second (50 ids) fails
        mock.expect_delete_batch()
            .times(2)
            .returning(|_, batch| {
                if batch.len() == 100 {
                    Ok(())
                } else {
                    Err(DeleteError::Api("rate limited".to_string()))
                }
            });

        let report = delete_in_batches(&mock, 1, &ids).await;
        assert_eq!(report.deleted.len(), 100);
        assert_eq!(report.failed.len(), 50);
        assert!(report.failed.contains(&150));
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_batches() {
        let ids: Vec<i32> = (1..=201).collect();
        let mut mock = MockMessageDeleter::new();

        let mut fail_first = true;
        mock.expect_delete_batch().times(3).returning(move |_, _| {
            if fail_first {
                fail_first = false;
                Err(DeleteError::Api("boom".to_string()))
            } else {
                Ok(())
            }
        });

        let report = delete_in_batches(&mock, 1, &ids).await;
        assert_eq!(report.failed.len(), 100);
        assert_eq!(report.deleted.len(), 101);
    }

    #[tokio::test]
    async fn test_empty_input_issues_no_calls() {
        let mock = MockMessageDeleter::new();
        let report = delete_in_batches(&mock, 1, &[]).await;
        assert!(report.deleted.is_empty());
        assert!(report.failed.is_empty());
    }
}
