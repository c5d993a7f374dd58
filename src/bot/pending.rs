//! Short-lived pending actions for the custom-time reply flow.
//!
//! The "Custom Time" button sends a force-reply prompt; the continuation is
//! stored here as an explicit record keyed by (chat, prompt message id) with
//! a TTL, instead of an implicit reply-handler closure. Unanswered prompts
//! simply expire.

use moka::future::Cache;
use std::time::Duration;

/// Continuation data for a custom-time prompt awaiting a numeric reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCustomTime {
    /// Chat whose deletion delay is being configured
    pub target_chat_id: i64,
    /// Cached chat title for the confirmation text
    pub title: String,
    /// User who started the flow
    pub owner_user_id: i64,
}

/// TTL cache of (prompt chat, prompt message id) -> pending continuation
#[derive(Clone)]
pub struct PendingActions {
    cache: Cache<(i64, i32), PendingCustomTime>,
}

impl PendingActions {
    /// Create a registry with the given prompt TTL and capacity
    #[must_use]
    pub fn new(ttl_secs: u64, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        Self { cache }
    }

    /// Register a pending continuation for a sent prompt message
    pub async fn register(&self, chat_id: i64, prompt_message_id: i32, action: PendingCustomTime) {
        self.cache
            .insert((chat_id, prompt_message_id), action)
            .await;
    }

    /// Consume the continuation for a reply, if one is pending.
    ///
    /// One-shot: a second call for the same prompt returns `None`.
    pub async fn take(
        &self,
        chat_id: i64,
        reply_to_message_id: i32,
    ) -> Option<PendingCustomTime> {
        let key = (chat_id, reply_to_message_id);
        let action = self.cache.get(&key).await?;
        self.cache.invalidate(&key).await;
        Some(action)
    }

    /// Current number of prompts awaiting a reply
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}
