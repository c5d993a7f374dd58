//! Enable/disable/list operations over watched chats.
//!
//! The conversational UI drives these three operations; the sweep re-reads
//! store state each cycle, so effects here are observed on the next cycle
//! with no extra synchronization.

use crate::storage::{ChatLedger, ChatRef, StorageError, StorageProvider};
use std::sync::Arc;
use tracing::info;

/// Service wrapping the per-chat deletion configuration
#[derive(Clone)]
pub struct Watchlist {
    store: Arc<dyn StorageProvider>,
}

impl Watchlist {
    /// Create a watchlist over the given store
    #[must_use]
    pub fn new(store: Arc<dyn StorageProvider>) -> Self {
        Self { store }
    }

    /// Enable media deletion for a chat with the given delay.
    ///
    /// Upserts the ledger, clearing any stale records, and mirrors the chat
    /// into the owner's index.
    ///
    /// # Errors
    ///
    /// Returns an error if the delay is negative or persistence fails.
    pub async fn enable(
        &self,
        chat_id: i64,
        title: &str,
        owner_user_id: i64,
        delay_secs: i64,
    ) -> Result<(), StorageError> {
        if delay_secs < 0 {
            return Err(StorageError::Config(format!(
                "delay must be non-negative, got {delay_secs}"
            )));
        }

        self.store
            .save_ledger(&ChatLedger::new(chat_id, delay_secs))
            .await?;
        self.store
            .add_user_chat(
                owner_user_id,
                ChatRef {
                    chat_id,
                    title: title.to_string(),
                },
            )
            .await?;

        info!(
            "Enabled media deletion for chat {} ({}s delay, owner {})",
            chat_id, delay_secs, owner_user_id
        );
        Ok(())
    }

    /// Disable media deletion for a chat.
    ///
    /// Deletes the ledger (dropping pending records wholesale) and removes
    /// the chat from every user's index, since another admin may have
    /// enabled it.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub async fn disable(&self, chat_id: i64, owner_user_id: i64) -> Result<(), StorageError> {
        self.store.delete_ledger(chat_id).await?;
        self.store.purge_chat_refs(chat_id).await?;
        info!(
            "Disabled media deletion for chat {} (owner {})",
            chat_id, owner_user_id
        );
        Ok(())
    }

    /// The chats a user has configured, with cached titles.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be loaded.
    pub async fn list(&self, user_id: i64) -> Result<Vec<ChatRef>, StorageError> {
        Ok(self.store.load_user_index(user_id).await?.chats)
    }

    /// Whether a chat currently has an active deletion configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be loaded.
    pub async fn is_watched(&self, chat_id: i64) -> Result<bool, StorageError> {
        Ok(self.store.load_ledger(chat_id).await?.is_some())
    }
}
