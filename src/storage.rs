//! Persistence layer for the deletion ledger and user chat index
//!
//! Provides a persistent storage implementation using Cloudflare R2 / AWS S3.
//! Two collections are kept as JSON objects: one ledger per watched chat
//! (`chats/{chat_id}.json`) and one index per user (`users/{user_id}.json`).

use crate::config::Settings;
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use thiserror::Error;
use tracing::{error, info, warn};

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error retrieving object from S3
    #[error("S3 Get error: {0}")]
    S3Get(Box<SdkError<GetObjectError>>),
    /// Error putting object into S3
    #[error("S3 put error: {0}")]
    S3Put(String),
    /// Error listing objects in S3
    #[error("S3 list error: {0}")]
    S3List(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration error (missing credentials, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A media message awaiting expiry-based deletion
///
/// `observed_at` is epoch seconds at ingestion time; it is never in the future.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct MediaRecord {
    /// Telegram message id, unique within its chat
    pub message_id: i32,
    /// Epoch seconds when the message was observed
    pub observed_at: i64,
}

/// Per-chat deletion configuration and pending records
///
/// Absence of a ledger means the chat is not managed.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatLedger {
    /// Telegram chat id
    pub chat_id: i64,
    /// Delay before a media message becomes eligible for deletion
    pub delete_after_secs: i64,
    /// Pending media records, in ingestion order
    pub records: Vec<MediaRecord>,
}

impl ChatLedger {
    /// Create an empty ledger for a chat with the given delay
    #[must_use]
    pub const fn new(chat_id: i64, delete_after_secs: i64) -> Self {
        Self {
            chat_id,
            delete_after_secs,
            records: Vec::new(),
        }
    }
}

/// Denormalized back-reference from a user's index to a watched chat
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatRef {
    /// Telegram chat id
    pub chat_id: i64,
    /// Cached chat title for display in /list
    pub title: String,
}

/// Set of chats a user has configured for media deletion
///
/// Membership mirrors ledger existence: a chat appears here iff it has an
/// active ledger.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct UserChatIndex {
    /// Owning Telegram user id
    pub user_id: i64,
    /// Configured chats with cached titles
    pub chats: Vec<ChatRef>,
}

/// Interface for storage providers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Load the ledger for a chat, if the chat is managed
    async fn load_ledger(&self, chat_id: i64) -> Result<Option<ChatLedger>, StorageError>;
    /// Create or replace the ledger for a chat
    async fn save_ledger(&self, ledger: &ChatLedger) -> Result<(), StorageError>;
    /// Delete the ledger for a chat, dropping its pending records wholesale
    async fn delete_ledger(&self, chat_id: i64) -> Result<(), StorageError>;
    /// List all chat ledgers
    async fn list_ledgers(&self) -> Result<Vec<ChatLedger>, StorageError>;
    /// Append a record to a chat's ledger; returns `false` if the chat is
    /// not managed (the record is dropped, never buffered)
    async fn append_record(&self, chat_id: i64, record: MediaRecord)
        -> Result<bool, StorageError>;
    /// Remove exactly the given message ids from a chat's ledger
    ///
    /// Never replaces the record list wholesale, so it commutes with a
    /// concurrent `append_record` for the same chat.
    async fn remove_records(&self, chat_id: i64, message_ids: &[i32])
        -> Result<(), StorageError>;
    /// Load a user's chat index (empty if the user has configured nothing)
    async fn load_user_index(&self, user_id: i64) -> Result<UserChatIndex, StorageError>;
    /// Add or refresh a chat reference in a user's index
    async fn add_user_chat(&self, user_id: i64, chat: ChatRef) -> Result<(), StorageError>;
    /// Remove a chat reference from every user's index
    ///
    /// Several admins may carry a reference to the same chat; disabling the
    /// chat must drop all of them, not only the disabler's.
    async fn purge_chat_refs(&self, chat_id: i64) -> Result<(), StorageError>;
    /// Check connection to storage
    async fn check_connection(&self) -> Result<(), String>;
}

/// R2-backed storage implementation
pub struct R2Storage {
    client: Client,
    bucket: String,
    cache: Cache<String, Arc<Vec<u8>>>,
    // Serializes read-modify-write mutations so remove-by-id and append
    // cannot interleave between load and save.
    write_lock: Mutex<()>,
}

impl R2Storage {
    /// Create a new R2 storage instance
    ///
    /// # Errors
    ///
    /// Returns an error if R2 configuration is missing.
    pub async fn new(settings: &Settings) -> Result<Self, StorageError> {
        let endpoint_url = settings
            .r2_endpoint_url
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ENDPOINT_URL is missing".into()))?;
        let access_key = settings
            .r2_access_key_id
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ACCESS_KEY_ID is missing".into()))?;
        let secret_key = settings
            .r2_secret_access_key
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_SECRET_ACCESS_KEY is missing".into()))?;
        let bucket = settings
            .r2_bucket_name
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_BUCKET_NAME is missing".into()))?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "r2-storage");

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("auto"))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();

        let client = Client::from_conf(s3_config);

        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(60 * 60)) // 1 hour
            .time_to_idle(Duration::from_secs(30 * 60)) // 30 minutes
            .build();

        Ok(Self {
            client,
            bucket: bucket.clone(),
            cache,
            write_lock: Mutex::new(()),
        })
    }

    /// Save data as JSON to R2
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization or S3 upload fails.
    pub async fn save_json<T: serde::Serialize + Sync>(
        &self,
        key: &str,
        data: &T,
    ) -> Result<(), StorageError> {
        let body_str = serde_json::to_string_pretty(data)?;
        let body_bytes = body_str.into_bytes();

        // Write-Through: update cache immediately
        self.cache
            .insert(key.to_string(), Arc::new(body_bytes.clone()))
            .await;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body_bytes))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StorageError::S3Put(e.to_string()))?;

        Ok(())
    }

    /// Load data from JSON in R2
    ///
    /// # Errors
    ///
    /// Returns an error if S3 download or JSON deserialization fails.
    pub async fn load_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        // Read-Through: check cache first
        if let Some(cached_data) = self.cache.get(key).await {
            match serde_json::from_slice(&cached_data) {
                Ok(data) => return Ok(Some(data)),
                Err(e) => {
                    warn!("Cache deserialization failed for {}: {}", key, e);
                    self.cache.invalidate(key).await;
                }
            }
        }

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
                    .into_bytes();

                // Read-Through: populate cache on miss
                self.cache
                    .insert(key.to_string(), Arc::new(data.to_vec()))
                    .await;

                let json_data = serde_json::from_slice(&data)?;
                Ok(Some(json_data))
            }
            Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => Ok(None),
            Err(e) => Err(StorageError::S3Get(Box::new(e))),
        }
    }

    /// Delete object from R2
    ///
    /// # Errors
    ///
    /// Returns an error if S3 deletion fails.
    pub async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.cache.invalidate(key).await;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::S3Put(e.to_string()))?;

        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }

            let page = req
                .send()
                .await
                .map_err(|e| StorageError::S3List(e.to_string()))?;

            for obj in page.contents() {
                if let Some(key) = obj.key() {
                    keys.push(key.to_string());
                }
            }

            if page.is_truncated() == Some(true) {
                continuation = page.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl StorageProvider for R2Storage {
    async fn load_ledger(&self, chat_id: i64) -> Result<Option<ChatLedger>, StorageError> {
        self.load_json(&chat_ledger_key(chat_id)).await
    }

    async fn save_ledger(&self, ledger: &ChatLedger) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.save_json(&chat_ledger_key(ledger.chat_id), ledger)
            .await
    }

    async fn delete_ledger(&self, chat_id: i64) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.delete_object(&chat_ledger_key(chat_id)).await
    }

    async fn list_ledgers(&self) -> Result<Vec<ChatLedger>, StorageError> {
        let keys = self.list_keys(CHAT_LEDGER_PREFIX).await?;
        let mut ledgers = Vec::with_capacity(keys.len());
        for key in keys {
            match self.load_json::<ChatLedger>(&key).await {
                Ok(Some(ledger)) => ledgers.push(ledger),
                // Deleted between listing and loading
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable ledger {}: {}", key, e),
            }
        }
        Ok(ledgers)
    }

    async fn append_record(
        &self,
        chat_id: i64,
        record: MediaRecord,
    ) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let key = chat_ledger_key(chat_id);
        let Some(mut ledger) = self.load_json::<ChatLedger>(&key).await? else {
            // Deletion not configured for this chat: ignore, never buffer
            return Ok(false);
        };
        ledger.records.push(record);
        self.save_json(&key, &ledger).await?;
        Ok(true)
    }

    async fn remove_records(
        &self,
        chat_id: i64,
        message_ids: &[i32],
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let key = chat_ledger_key(chat_id);
        let Some(mut ledger) = self.load_json::<ChatLedger>(&key).await? else {
            return Ok(());
        };
        let before = ledger.records.len();
        ledger
            .records
            .retain(|r| !message_ids.contains(&r.message_id));
        if ledger.records.len() != before {
            self.save_json(&key, &ledger).await?;
        }
        Ok(())
    }

    async fn load_user_index(&self, user_id: i64) -> Result<UserChatIndex, StorageError> {
        Ok(self
            .load_json(&user_index_key(user_id))
            .await?
            .unwrap_or_else(|| UserChatIndex {
                user_id,
                chats: Vec::new(),
            }))
    }

    async fn add_user_chat(&self, user_id: i64, chat: ChatRef) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let key = user_index_key(user_id);
        let mut index: UserChatIndex =
            self.load_json(&key).await?.unwrap_or_else(|| UserChatIndex {
                user_id,
                chats: Vec::new(),
            });
        // Refresh in place rather than accumulating duplicates
        index.chats.retain(|c| c.chat_id != chat.chat_id);
        index.chats.push(chat);
        self.save_json(&key, &index).await
    }

    async fn purge_chat_refs(&self, chat_id: i64) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let keys = self.list_keys(USER_INDEX_PREFIX).await?;
        for key in keys {
            let Some(mut index) = self.load_json::<UserChatIndex>(&key).await? else {
                continue;
            };
            let before = index.chats.len();
            index.chats.retain(|c| c.chat_id != chat_id);
            if index.chats.len() != before {
                self.save_json(&key, &index).await?;
            }
        }
        Ok(())
    }

    /// Check connection to R2 storage
    async fn check_connection(&self) -> Result<(), String> {
        match self.client.list_buckets().send().await {
            Ok(_) => {
                info!("Successfully connected to R2 storage.");
                Ok(())
            }
            Err(e) => {
                let err_msg = format!("R2 connectivity test failed: {e:#?}");
                error!("{}", err_msg);
                Err(err_msg)
            }
        }
    }
}

const CHAT_LEDGER_PREFIX: &str = "chats/";
const USER_INDEX_PREFIX: &str = "users/";

/// Returns the R2 key for a chat's ledger file
#[must_use]
pub fn chat_ledger_key(chat_id: i64) -> String {
    format!("{CHAT_LEDGER_PREFIX}{chat_id}.json")
}

/// Returns the R2 key for a user's chat index file
#[must_use]
pub fn user_index_key(user_id: i64) -> String {
    format!("{USER_INDEX_PREFIX}{user_id}.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_keys() {
        assert_eq!(chat_ledger_key(555), "chats/555.json");
        assert_eq!(chat_ledger_key(-1_001_234), "chats/-1001234.json");
        assert_eq!(user_index_key(42), "users/42.json");
    }

    #[test]
    fn test_ledger_json_shape() -> Result<(), serde_json::Error> {
        let ledger = ChatLedger {
            chat_id: 555,
            delete_after_secs: 900,
            records: vec![MediaRecord {
                message_id: 1,
                observed_at: 1_700_000_000,
            }],
        };
        let json = serde_json::to_string(&ledger)?;
        let back: ChatLedger = serde_json::from_str(&json)?;
        assert_eq!(back.chat_id, 555);
        assert_eq!(back.delete_after_secs, 900);
        assert_eq!(back.records.len(), 1);
        Ok(())
    }
}
