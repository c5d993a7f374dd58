//! Command and message handlers.
//!
//! The ingestion hook lives here: every media message in a watched group and
//! every media channel post appends a timestamped record to the ledger.
//! Persistence failures on that path are logged and swallowed so the
//! dispatcher never stalls on storage.

use super::admin_cache::{is_chat_admin, AdminCache};
use super::pending::PendingActions;
use super::views;
use crate::storage::{MediaRecord, StorageProvider};
use crate::watchlist::Watchlist;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{MessageOrigin, ParseMode};
use teloxide::utils::command::BotCommands;
use tracing::{debug, warn};

/// Supported commands for the bot
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Start the bot and show setup options
    #[command(description = "Start the bot.")]
    Start,
    /// List configured chats
    #[command(description = "List your configured chats.")]
    List,
    /// Show help
    #[command(description = "Show help.")]
    Help,
}

/// User id of the sender, falling back to the chat id (private chats)
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from
        .as_ref()
        .map_or(msg.chat.id.0, |u| u.id.0.cast_signed())
}

/// Whether the message carries a media payload the sweeper manages
#[must_use]
pub fn has_media(msg: &Message) -> bool {
    msg.photo().is_some()
        || msg.video().is_some()
        || msg.document().is_some()
        || msg.audio().is_some()
}

/// Whether this is a channel post forwarded into a private chat
#[must_use]
pub fn is_channel_forward(msg: &Message) -> bool {
    msg.chat.is_private()
        && matches!(msg.forward_origin(), Some(MessageOrigin::Channel { .. }))
}

/// Dispatch a parsed command
///
/// # Errors
///
/// Returns an error if a Telegram call fails.
pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    watchlist: Arc<Watchlist>,
    admin_cache: Arc<AdminCache>,
) -> Result<()> {
    // In groups, configuration commands are admin-only; silently ignore others
    if msg.chat.is_group() || msg.chat.is_supergroup() {
        let Some(user) = msg.from.as_ref() else {
            return Ok(());
        };
        if !is_chat_admin(&bot, &admin_cache, msg.chat.id, user.id).await {
            return Ok(());
        }
    }

    match cmd {
        Command::Start => start(bot, msg, watchlist).await,
        Command::List => list(bot, msg, watchlist).await,
        Command::Help => {
            bot.send_message(msg.chat.id, views::help_text())
                .parse_mode(ParseMode::Html)
                .await?;
            Ok(())
        }
    }
}

async fn start(bot: Bot, msg: Message, watchlist: Arc<Watchlist>) -> Result<()> {
    let chat_id = msg.chat.id.0;
    let title = msg.chat.title().unwrap_or("this chat");

    if msg.chat.is_group() || msg.chat.is_supergroup() {
        if watchlist.is_watched(chat_id).await.unwrap_or(false) {
            bot.send_message(msg.chat.id, views::already_configured_text(chat_id))
                .parse_mode(ParseMode::Html)
                .reply_markup(views::configured_keyboard(chat_id, title))
                .await?;
        } else {
            bot.send_message(msg.chat.id, views::group_onboarding_text())
                .parse_mode(ParseMode::Html)
                .reply_markup(views::add_group_keyboard(chat_id, title))
                .await?;
        }
    } else {
        bot.send_message(msg.chat.id, views::onboarding_text())
            .parse_mode(ParseMode::Html)
            .reply_markup(views::help_keyboard())
            .await?;
    }
    Ok(())
}

async fn list(bot: Bot, msg: Message, watchlist: Arc<Watchlist>) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    let chats = watchlist.list(user_id).await?;

    if chats.is_empty() {
        bot.send_message(msg.chat.id, "No chats found.").await?;
    } else {
        bot.send_message(msg.chat.id, views::chat_list_text(&chats))
            .parse_mode(ParseMode::Html)
            .await?;
    }
    Ok(())
}

/// Append a ledger record for one observed media message.
///
/// No-op when the chat is unmanaged; persistence errors are swallowed after
/// logging because no one is waiting on this path.
pub async fn ingest_media(store: &dyn StorageProvider, chat_id: i64, message_id: i32) {
    let record = MediaRecord {
        message_id,
        observed_at: Utc::now().timestamp(),
    };

    match store.append_record(chat_id, record).await {
        Ok(true) => debug!("Recorded media message {} in chat {}", message_id, chat_id),
        Ok(false) => {}
        Err(e) => warn!(
            "Failed to persist media record {} for chat {}: {}",
            message_id, chat_id, e
        ),
    }
}

/// Ingestion hook for group media messages
///
/// # Errors
///
/// Infallible; returns `Result` to fit the handler signature.
pub async fn handle_group_media(msg: Message, store: Arc<dyn StorageProvider>) -> Result<()> {
    // Also reached as the fall-through for unmatched replies, which may not
    // carry media at all
    if (msg.chat.is_group() || msg.chat.is_supergroup()) && has_media(&msg) {
        ingest_media(store.as_ref(), msg.chat.id.0, msg.id.0).await;
    }
    Ok(())
}

/// Ingestion hook for media channel posts
///
/// # Errors
///
/// Infallible; returns `Result` to fit the handler signature.
pub async fn handle_channel_post(msg: Message, store: Arc<dyn StorageProvider>) -> Result<()> {
    ingest_media(store.as_ref(), msg.chat.id.0, msg.id.0).await;
    Ok(())
}

/// Offer channel setup when a channel post is forwarded to the bot
///
/// # Errors
///
/// Returns an error if the offer message fails to send.
pub async fn handle_channel_forward(bot: Bot, msg: Message) -> Result<()> {
    let Some(MessageOrigin::Channel { chat, .. }) = msg.forward_origin() else {
        return Ok(());
    };
    let title = chat.title().unwrap_or("this channel");

    bot.send_message(msg.chat.id, views::forward_offer_text(title))
        .parse_mode(ParseMode::Html)
        .reply_markup(views::forward_offer_keyboard(chat.id.0, title))
        .await?;
    Ok(())
}

/// Handle a reply to a pending custom-time prompt.
///
/// Works in private chats and groups alike. Replies that don't match a
/// registered prompt, or that come from a user other than the one who
/// started the flow, fall through to media ingestion so an ordinary group
/// reply is still recorded.
///
/// # Errors
///
/// Returns an error if a Telegram call fails.
pub async fn handle_pending_reply(
    bot: Bot,
    msg: Message,
    pending: Arc<PendingActions>,
    store: Arc<dyn StorageProvider>,
) -> Result<()> {
    let Some(prompt) = msg.reply_to_message() else {
        return handle_group_media(msg, store).await;
    };
    let prompt_id = prompt.id;
    let Some(action) = pending.take(msg.chat.id.0, prompt_id.0).await else {
        return handle_group_media(msg, store).await;
    };

    // Only the user who started the flow may answer the prompt
    if get_user_id_safe(&msg) != action.owner_user_id {
        pending.register(msg.chat.id.0, prompt_id.0, action).await;
        return handle_group_media(msg, store).await;
    }

    let delay_secs = msg
        .text()
        .and_then(|t| t.trim().parse::<i64>().ok())
        .filter(|&s| s >= 0);

    match delay_secs {
        Some(secs) => {
            bot.send_message(
                msg.chat.id,
                format!(
                    "Media from \"{}\" will be deleted after {secs} seconds.",
                    html_escape::encode_text(&action.title)
                ),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(views::confirm_keyboard(secs, action.target_chat_id, &action.title))
            .await?;
            bot.delete_message(msg.chat.id, prompt_id).await?;
        }
        None => {
            bot.send_message(
                msg.chat.id,
                "That doesn't look like a number of seconds. Press Custom Time to try again.",
            )
            .await?;
        }
    }
    Ok(())
}
