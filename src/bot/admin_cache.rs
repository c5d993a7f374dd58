//! Cached admin-status lookups for permission guards.
//!
//! `getChatMember` results are cached with a TTL so repeated button presses
//! don't hammer the API, while a demoted admin falls out of the cache within
//! the TTL instead of staying privileged forever. Disabling a chat
//! invalidates its entries immediately.

use moka::future::Cache;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{ChatId, UserId};
use tracing::warn;

/// TTL cache of (chat, user) -> is-admin
#[derive(Clone)]
pub struct AdminCache {
    cache: Cache<(i64, i64), bool>,
}

impl AdminCache {
    /// Create a cache with the given entry TTL and capacity
    #[must_use]
    pub fn new(ttl_secs: u64, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        Self { cache }
    }

    /// Cached admin status for a (chat, user) pair, if present
    pub async fn get(&self, chat_id: i64, user_id: i64) -> Option<bool> {
        self.cache.get(&(chat_id, user_id)).await
    }

    /// Record an admin status for a (chat, user) pair
    pub async fn insert(&self, chat_id: i64, user_id: i64, is_admin: bool) {
        self.cache.insert((chat_id, user_id), is_admin).await;
    }

    /// Drop the cached status for a (chat, user) pair.
    ///
    /// Called on role-affecting events such as disabling a chat.
    pub async fn invalidate(&self, chat_id: i64, user_id: i64) {
        self.cache.invalidate(&(chat_id, user_id)).await;
    }

    /// Current number of cached entries
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

/// Whether `user_id` is an owner or administrator of `chat_id`.
///
/// Returns `false` when the lookup fails; API failures are not cached, only
/// definite answers are.
pub async fn is_chat_admin(
    bot: &Bot,
    cache: &AdminCache,
    chat_id: ChatId,
    user_id: UserId,
) -> bool {
    let key_user = user_id.0.cast_signed();
    if let Some(cached) = cache.get(chat_id.0, key_user).await {
        return cached;
    }

    match bot.get_chat_member(chat_id, user_id).await {
        Ok(member) => {
            let is_admin = member.is_privileged();
            cache.insert(chat_id.0, key_user, is_admin).await;
            is_admin
        }
        Err(e) => {
            warn!(
                "get_chat_member failed for chat {} user {}: {}",
                chat_id, user_id, e
            );
            false
        }
    }
}

/// Whether the bot itself has admin rights in `chat_id`.
///
/// # Errors
///
/// Returns an error if the membership lookup fails, so the caller can show
/// the "bot is not an admin" acknowledgment.
pub async fn is_bot_admin(
    bot: &Bot,
    cache: &AdminCache,
    chat_id: ChatId,
) -> Result<bool, teloxide::RequestError> {
    let me = bot.get_me().await?;
    let key_user = me.id.0.cast_signed();
    if let Some(cached) = cache.get(chat_id.0, key_user).await {
        return Ok(cached);
    }

    let member = bot.get_chat_member(chat_id, me.id).await?;
    let is_admin = member.is_privileged();
    cache.insert(chat_id.0, key_user, is_admin).await;
    Ok(is_admin)
}
