//! Callback-query wire format and dispatch.
//!
//! Payloads are `;`-separated: `yes;<chat_id>;<title>`,
//! `time;<secs>;<chat_id>;<title>`, `custom;<chat_id>;<title>`,
//! `confirm;<secs>;<chat_id>;<title>`, `disable;<chat_id>;<title>`, plus the
//! bare actions `no`, `cancel`, `help`, `back`. The title rides along so the
//! flow needs no chat lookup; it is clipped to keep payloads under
//! Telegram's 64-byte limit. Every payload is parsed into one
//! [`CallbackAction`] and handled by exactly one branch.

use super::admin_cache::{is_bot_admin, is_chat_admin, AdminCache};
use super::pending::{PendingActions, PendingCustomTime};
use super::views;
use crate::watchlist::Watchlist;
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ForceReply, MessageId, ParseMode};
use tracing::warn;

/// Bare payload: dismiss a Yes/No offer
pub const CB_DISMISS: &str = "no";
/// Bare payload: cancel the current keyboard
pub const CB_CANCEL: &str = "cancel";
/// Bare payload: show help
pub const CB_HELP: &str = "help";
/// Bare payload: back to onboarding
pub const CB_BACK: &str = "back";

// Callback data is limited to 64 bytes; the longest prefix is
// "confirm;<secs>;<chat_id>;" at ~35 bytes.
const MAX_TITLE_BYTES: usize = 24;

fn clip_title(title: &str) -> &str {
    if title.len() <= MAX_TITLE_BYTES {
        return title;
    }
    let mut end = MAX_TITLE_BYTES;
    while !title.is_char_boundary(end) {
        end -= 1;
    }
    &title[..end]
}

/// Build a `yes` (start setup) payload
#[must_use]
pub fn cb_setup(chat_id: i64, title: &str) -> String {
    format!("yes;{chat_id};{}", clip_title(title))
}

/// Build a `time` (preset delay) payload
#[must_use]
pub fn cb_delay(delay_secs: i64, chat_id: i64, title: &str) -> String {
    format!("time;{delay_secs};{chat_id};{}", clip_title(title))
}

/// Build a `custom` (ask for seconds) payload
#[must_use]
pub fn cb_custom(chat_id: i64, title: &str) -> String {
    format!("custom;{chat_id};{}", clip_title(title))
}

/// Build a `confirm` (custom delay confirmed) payload
#[must_use]
pub fn cb_confirm(delay_secs: i64, chat_id: i64, title: &str) -> String {
    format!("confirm;{delay_secs};{chat_id};{}", clip_title(title))
}

/// Build a `disable` payload
#[must_use]
pub fn cb_disable(chat_id: i64, title: &str) -> String {
    format!("disable;{chat_id};{}", clip_title(title))
}

/// One decoded callback payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// Start setup for a chat: show the delay picker
    Setup {
        /// Target chat id
        chat_id: i64,
        /// Cached chat title
        title: String,
    },
    /// A preset delay was picked
    SetDelay {
        /// Chosen delay in seconds
        delay_secs: i64,
        /// Target chat id
        chat_id: i64,
        /// Cached chat title
        title: String,
    },
    /// Ask the user to type a delay in seconds
    CustomDelay {
        /// Target chat id
        chat_id: i64,
        /// Cached chat title
        title: String,
    },
    /// A typed delay was confirmed
    ConfirmDelay {
        /// Confirmed delay in seconds
        delay_secs: i64,
        /// Target chat id
        chat_id: i64,
        /// Cached chat title
        title: String,
    },
    /// Turn deletion off for a chat
    Disable {
        /// Target chat id
        chat_id: i64,
        /// Cached chat title
        title: String,
    },
    /// Show the help text
    Help,
    /// Back to the onboarding text
    Back,
    /// Remove the current keyboard message
    Cancel,
    /// Dismiss a Yes/No offer
    Dismiss,
}

/// Parse a callback payload.
///
/// Returns `None` for unknown or malformed payloads (e.g. from a stale
/// keyboard of an older bot version).
#[must_use]
pub fn parse(data: &str) -> Option<CallbackAction> {
    match data {
        CB_DISMISS => return Some(CallbackAction::Dismiss),
        CB_CANCEL => return Some(CallbackAction::Cancel),
        CB_HELP => return Some(CallbackAction::Help),
        CB_BACK => return Some(CallbackAction::Back),
        _ => {}
    }

    let (action, rest) = data.split_once(';')?;
    match action {
        "yes" | "custom" | "disable" => {
            let (chat_id, title) = rest.split_once(';')?;
            let chat_id = chat_id.parse().ok()?;
            let title = title.to_string();
            Some(match action {
                "yes" => CallbackAction::Setup { chat_id, title },
                "custom" => CallbackAction::CustomDelay { chat_id, title },
                _ => CallbackAction::Disable { chat_id, title },
            })
        }
        "time" | "confirm" => {
            let (delay_secs, rest) = rest.split_once(';')?;
            let (chat_id, title) = rest.split_once(';')?;
            let delay_secs = delay_secs.parse().ok()?;
            let chat_id = chat_id.parse().ok()?;
            let title = title.to_string();
            Some(if action == "time" {
                CallbackAction::SetDelay {
                    delay_secs,
                    chat_id,
                    title,
                }
            } else {
                CallbackAction::ConfirmDelay {
                    delay_secs,
                    chat_id,
                    title,
                }
            })
        }
        _ => None,
    }
}

/// Context of the message the pressed keyboard was attached to
struct CallbackOrigin {
    chat_id: ChatId,
    message_id: MessageId,
}

/// Handle a callback query end to end.
///
/// # Errors
///
/// Returns an error if a Telegram call fails after the action was decoded.
pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    watchlist: Arc<Watchlist>,
    admin_cache: Arc<AdminCache>,
    pending: Arc<PendingActions>,
) -> Result<()> {
    let Some(origin_msg) = q.message.as_ref() else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    let origin = CallbackOrigin {
        chat_id: origin_msg.chat().id,
        message_id: origin_msg.id(),
    };

    // In groups only admins may press configuration buttons
    let origin_chat = origin_msg.chat();
    if (origin_chat.is_group() || origin_chat.is_supergroup())
        && !is_chat_admin(&bot, &admin_cache, origin.chat_id, q.from.id).await
    {
        bot.answer_callback_query(q.id.clone())
            .text("Only admins can use this feature in groups.")
            .show_alert(true)
            .await?;
        return Ok(());
    }

    let Some(action) = q.data.as_deref().and_then(parse) else {
        warn!("Ignoring unknown callback payload: {:?}", q.data);
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    let owner_user_id = q.from.id.0.cast_signed();

    match action {
        CallbackAction::Setup { chat_id, title } => {
            handle_setup(&bot, &q, &admin_cache, &origin, chat_id, &title).await
        }
        CallbackAction::SetDelay {
            delay_secs,
            chat_id,
            title,
        }
        | CallbackAction::ConfirmDelay {
            delay_secs,
            chat_id,
            title,
        } => {
            handle_enable(
                &bot,
                &q,
                &watchlist,
                &origin,
                EnableRequest {
                    chat_id,
                    title,
                    owner_user_id,
                    delay_secs,
                },
            )
            .await
        }
        CallbackAction::CustomDelay { chat_id, title } => {
            handle_custom_prompt(&bot, &q, &pending, &origin, chat_id, title, owner_user_id).await
        }
        CallbackAction::Disable { chat_id, title } => {
            handle_disable(
                &bot,
                &q,
                &watchlist,
                &admin_cache,
                &origin,
                chat_id,
                &title,
            )
            .await
        }
        CallbackAction::Help | CallbackAction::Back | CallbackAction::Cancel
        | CallbackAction::Dismiss => handle_static_view(&bot, &q, &origin, &action).await,
    }
}

/// Handle the navigation actions that only touch the prompt message itself.
async fn handle_static_view(
    bot: &Bot,
    q: &CallbackQuery,
    origin: &CallbackOrigin,
    action: &CallbackAction,
) -> Result<()> {
    match action {
        CallbackAction::Help => {
            bot.edit_message_text(origin.chat_id, origin.message_id, views::help_text())
                .parse_mode(ParseMode::Html)
                .reply_markup(views::back_keyboard())
                .await?;
            bot.answer_callback_query(q.id.clone()).await?;
        }
        CallbackAction::Back => {
            bot.edit_message_text(origin.chat_id, origin.message_id, views::onboarding_text())
                .parse_mode(ParseMode::Html)
                .reply_markup(views::help_keyboard())
                .await?;
            bot.answer_callback_query(q.id.clone()).await?;
        }
        _ => {
            bot.delete_message(origin.chat_id, origin.message_id).await?;
            bot.answer_callback_query(q.id.clone())
                .text("Action canceled.")
                .await?;
        }
    }
    Ok(())
}

async fn handle_setup(
    bot: &Bot,
    q: &CallbackQuery,
    admin_cache: &AdminCache,
    origin: &CallbackOrigin,
    chat_id: i64,
    title: &str,
) -> Result<()> {
    match is_bot_admin(bot, admin_cache, ChatId(chat_id)).await {
        Ok(true) => {
            bot.send_message(origin.chat_id, "Select a time to delete media:")
                .reply_markup(views::delay_keyboard(chat_id, title))
                .await?;
            bot.delete_message(origin.chat_id, origin.message_id).await?;
            bot.answer_callback_query(q.id.clone()).await?;
        }
        Ok(false) => {
            bot.send_message(
                origin.chat_id,
                "Please make the bot an admin in the chat to manage media deletion.",
            )
            .await?;
            bot.answer_callback_query(q.id.clone())
                .text("Bot is not an admin.")
                .show_alert(true)
                .await?;
        }
        Err(e) => {
            warn!("Bot admin check failed for chat {}: {}", chat_id, e);
            bot.answer_callback_query(q.id.clone())
                .text("Bot is not an admin in this chat.")
                .show_alert(true)
                .await?;
        }
    }
    Ok(())
}

struct EnableRequest {
    chat_id: i64,
    title: String,
    owner_user_id: i64,
    delay_secs: i64,
}

async fn handle_enable(
    bot: &Bot,
    q: &CallbackQuery,
    watchlist: &Watchlist,
    origin: &CallbackOrigin,
    req: EnableRequest,
) -> Result<()> {
    if let Err(e) = watchlist
        .enable(req.chat_id, &req.title, req.owner_user_id, req.delay_secs)
        .await
    {
        warn!("Enable failed for chat {}: {}", req.chat_id, e);
        bot.answer_callback_query(q.id.clone())
            .text("An error occurred. Please try again.")
            .show_alert(true)
            .await?;
        return Ok(());
    }

    bot.edit_message_text(
        origin.chat_id,
        origin.message_id,
        views::enabled_text(&req.title, req.delay_secs),
    )
    .parse_mode(ParseMode::Html)
    .reply_markup(views::disable_keyboard(req.chat_id, &req.title))
    .await?;
    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}

async fn handle_custom_prompt(
    bot: &Bot,
    q: &CallbackQuery,
    pending: &PendingActions,
    origin: &CallbackOrigin,
    chat_id: i64,
    title: String,
    owner_user_id: i64,
) -> Result<()> {
    let prompt = bot
        .send_message(origin.chat_id, "Enter time in seconds:")
        .reply_markup(ForceReply::new())
        .await?;

    pending
        .register(
            prompt.chat.id.0,
            prompt.id.0,
            PendingCustomTime {
                target_chat_id: chat_id,
                title,
                owner_user_id,
            },
        )
        .await;

    bot.delete_message(origin.chat_id, origin.message_id).await?;
    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}

async fn handle_disable(
    bot: &Bot,
    q: &CallbackQuery,
    watchlist: &Watchlist,
    admin_cache: &AdminCache,
    origin: &CallbackOrigin,
    chat_id: i64,
    title: &str,
) -> Result<()> {
    let owner_user_id = q.from.id.0.cast_signed();
    if let Err(e) = watchlist.disable(chat_id, owner_user_id).await {
        warn!("Disable failed for chat {}: {}", chat_id, e);
        bot.answer_callback_query(q.id.clone())
            .text("An error occurred. Please try again.")
            .show_alert(true)
            .await?;
        return Ok(());
    }

    // Role assumptions about this chat are stale now
    admin_cache.invalidate(chat_id, owner_user_id).await;

    bot.edit_message_text(origin.chat_id, origin.message_id, views::disabled_text(title))
        .parse_mode(ParseMode::Html)
        .reply_markup(views::reenable_keyboard(chat_id, title))
        .await?;
    bot.answer_callback_query(q.id.clone()).await?;
    Ok(())
}
