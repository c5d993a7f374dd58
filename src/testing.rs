//! Testing helpers: in-memory storage and a recording deleter.
//!
//! Used by unit tests and the integration scenarios in `tests/`. Not wired
//! into the production binary.

use crate::storage::{ChatLedger, ChatRef, MediaRecord, StorageProvider, UserChatIndex};
use crate::storage::StorageError;
use crate::sweep::deleter::{DeleteError, MessageDeleter};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// In-memory `StorageProvider` with the same remove-by-id semantics as the
/// R2 implementation.
#[derive(Default)]
pub struct InMemoryStore {
    ledgers: Mutex<HashMap<i64, ChatLedger>>,
    indexes: Mutex<HashMap<i64, UserChatIndex>>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending records for a chat (0 if unmanaged)
    pub async fn record_count(&self, chat_id: i64) -> usize {
        self.ledgers
            .lock()
            .await
            .get(&chat_id)
            .map_or(0, |l| l.records.len())
    }
}

#[async_trait]
impl StorageProvider for InMemoryStore {
    async fn load_ledger(&self, chat_id: i64) -> Result<Option<ChatLedger>, StorageError> {
        Ok(self.ledgers.lock().await.get(&chat_id).cloned())
    }

    async fn save_ledger(&self, ledger: &ChatLedger) -> Result<(), StorageError> {
        self.ledgers
            .lock()
            .await
            .insert(ledger.chat_id, ledger.clone());
        Ok(())
    }

    async fn delete_ledger(&self, chat_id: i64) -> Result<(), StorageError> {
        self.ledgers.lock().await.remove(&chat_id);
        Ok(())
    }

    async fn list_ledgers(&self) -> Result<Vec<ChatLedger>, StorageError> {
        Ok(self.ledgers.lock().await.values().cloned().collect())
    }

    async fn append_record(
        &self,
        chat_id: i64,
        record: MediaRecord,
    ) -> Result<bool, StorageError> {
        let mut ledgers = self.ledgers.lock().await;
        match ledgers.get_mut(&chat_id) {
            Some(ledger) => {
                ledger.records.push(record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_records(
        &self,
        chat_id: i64,
        message_ids: &[i32],
    ) -> Result<(), StorageError> {
        let mut ledgers = self.ledgers.lock().await;
        if let Some(ledger) = ledgers.get_mut(&chat_id) {
            ledger
                .records
                .retain(|r| !message_ids.contains(&r.message_id));
        }
        Ok(())
    }

    async fn load_user_index(&self, user_id: i64) -> Result<UserChatIndex, StorageError> {
        Ok(self
            .indexes
            .lock()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or(UserChatIndex {
                user_id,
                chats: Vec::new(),
            }))
    }

    async fn add_user_chat(&self, user_id: i64, chat: ChatRef) -> Result<(), StorageError> {
        let mut indexes = self.indexes.lock().await;
        let index = indexes.entry(user_id).or_insert_with(|| UserChatIndex {
            user_id,
            chats: Vec::new(),
        });
        index.chats.retain(|c| c.chat_id != chat.chat_id);
        index.chats.push(chat);
        Ok(())
    }

    async fn purge_chat_refs(&self, chat_id: i64) -> Result<(), StorageError> {
        for index in self.indexes.lock().await.values_mut() {
            index.chats.retain(|c| c.chat_id != chat_id);
        }
        Ok(())
    }

    async fn check_connection(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Deleter that records every batch it was asked to delete.
///
/// `fail_chats` lists chat ids whose delete calls always fail, simulating a
/// chat where the bot lost admin rights.
#[derive(Default)]
pub struct RecordingDeleter {
    /// Batches received, in call order
    pub calls: Mutex<Vec<(i64, Vec<i32>)>>,
    /// Chats for which every delete call fails
    pub fail_chats: Vec<i64>,
}

impl RecordingDeleter {
    /// Create a deleter that succeeds for every chat
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a deleter that fails for the given chats
    #[must_use]
    pub fn failing_for(chats: Vec<i64>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_chats: chats,
        }
    }

    /// Total number of delete calls issued so far
    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl MessageDeleter for RecordingDeleter {
    async fn delete_batch(&self, chat_id: i64, message_ids: &[i32]) -> Result<(), DeleteError> {
        self.calls
            .lock()
            .await
            .push((chat_id, message_ids.to_vec()));
        if self.fail_chats.contains(&chat_id) {
            return Err(DeleteError::Api("bot lost admin rights".to_string()));
        }
        Ok(())
    }
}
