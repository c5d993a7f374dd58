//! Presentation layer for the conversational UI.
//!
//! Contains keyboards and message texts for onboarding, delay selection, and
//! enable/disable flows. All texts are HTML; chat titles are escaped here.

use super::callbacks;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

/// Delay presets offered on the time-selection keyboard, two per row
const DELAY_PRESETS: &[(&str, i64)] = &[
    ("15 Minutes", 900),
    ("30 Minutes", 1_800),
    ("1 Hour", 3_600),
    ("6 Hours", 21_600),
    ("12 Hours", 43_200),
    ("24 Hours", 86_400),
];

/// Onboarding text for private chats
#[must_use]
pub fn onboarding_text() -> String {
    "<b>Media Sweeper Bot</b> 🎉\n\n\
     To get started, please either:\n\
     1. Forward a message from a channel where you want to manage media deletion.\n\
     2. Add this bot to a group to enable media deletion there.\n\n\
     Need more information? Use the Help button below."
        .to_string()
}

/// Onboarding text for a group that is not configured yet
#[must_use]
pub fn group_onboarding_text() -> String {
    "<b>Media Sweeper Bot</b> 🎉\n\n\
     This group is not set up for media deletion yet.\n\
     Press the button below to configure it."
        .to_string()
}

/// Text for a group that already has deletion configured
#[must_use]
pub fn already_configured_text(chat_id: i64) -> String {
    format!(
        "This group (ID: {chat_id}) is already set up for media deletion.\n\n\
         You can:\n\
         <b>Set New Time</b>: change the time for automatic media deletion.\n\
         <b>Disable</b>: turn off media deletion for this group."
    )
}

/// Help text shown behind the Help button and /help
#[must_use]
pub fn help_text() -> String {
    "<b>Media Sweeper Bot Help</b> 📖\n\n\
     This bot automatically deletes media from your chats after a specified time.\n\n\
     <b>How to use:</b>\n\
     1. <b>Groups:</b> add the bot to a group and run /start to set up media deletion.\n\
     2. <b>Channels:</b> forward a channel post to the bot to manage media deletion there.\n\n\
     Once added, make sure to give the bot <b>admin access</b> so it can delete messages.\n\n\
     <b>Commands:</b>\n\
     /list — the chats where you've configured this bot.\n\n\
     You can pick a preset time or set a custom one in seconds."
        .to_string()
}

/// Confirmation text after deletion is enabled
#[must_use]
pub fn enabled_text(title: &str, delay_secs: i64) -> String {
    format!(
        "Media from {} will be deleted after {delay_secs} seconds.",
        html_escape::encode_text(title)
    )
}

/// Text after deletion is disabled
#[must_use]
pub fn disabled_text(title: &str) -> String {
    format!(
        "Media deletion has been disabled for {}.",
        html_escape::encode_text(title)
    )
}

/// Question asked when a channel post is forwarded to the bot
#[must_use]
pub fn forward_offer_text(title: &str) -> String {
    format!(
        "Do you want to delete media from {}?",
        html_escape::encode_text(title)
    )
}

/// /list output
#[must_use]
pub fn chat_list_text(chats: &[crate::storage::ChatRef]) -> String {
    let mut out = String::from("Chats:\n");
    for chat in chats {
        out.push_str(&format!(
            "{} : {}\n",
            html_escape::encode_text(&chat.title),
            chat.chat_id
        ));
    }
    out
}

/// Single Help button
#[must_use]
pub fn help_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "Help",
        callbacks::CB_HELP,
    )]])
}

/// Single Back button under the help text
#[must_use]
pub fn back_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "Back",
        callbacks::CB_BACK,
    )]])
}

/// "Add This Group" button for an unconfigured group
#[must_use]
pub fn add_group_keyboard(chat_id: i64, title: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "Add This Group",
        callbacks::cb_setup(chat_id, title),
    )]])
}

/// "Set New Time" / "Disable" buttons for a configured group
#[must_use]
pub fn configured_keyboard(chat_id: i64, title: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "Set New Time",
            callbacks::cb_setup(chat_id, title),
        )],
        vec![InlineKeyboardButton::callback(
            "Disable",
            callbacks::cb_disable(chat_id, title),
        )],
    ])
}

/// Yes/No offer after a channel post is forwarded to the bot
#[must_use]
pub fn forward_offer_keyboard(chat_id: i64, title: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("Yes", callbacks::cb_setup(chat_id, title)),
        InlineKeyboardButton::callback("No", callbacks::CB_DISMISS),
    ]])
}

/// Preset-delay picker plus Custom Time and Cancel
#[must_use]
pub fn delay_keyboard(chat_id: i64, title: &str) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = DELAY_PRESETS
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|&(label, secs)| {
                    InlineKeyboardButton::callback(label, callbacks::cb_delay(secs, chat_id, title))
                })
                .collect()
        })
        .collect();
    rows.push(vec![
        InlineKeyboardButton::callback("Custom Time", callbacks::cb_custom(chat_id, title)),
        InlineKeyboardButton::callback("Cancel", callbacks::CB_CANCEL),
    ]);
    InlineKeyboardMarkup::new(rows)
}

/// Confirm/Cancel buttons for a custom delay
#[must_use]
pub fn confirm_keyboard(delay_secs: i64, chat_id: i64, title: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(
            "Confirm",
            callbacks::cb_confirm(delay_secs, chat_id, title),
        ),
        InlineKeyboardButton::callback("Cancel", callbacks::CB_CANCEL),
    ]])
}

/// Disable button shown after deletion is enabled
#[must_use]
pub fn disable_keyboard(chat_id: i64, title: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "Disable",
        callbacks::cb_disable(chat_id, title),
    )]])
}

/// Re-enable button shown after deletion is disabled
#[must_use]
pub fn reenable_keyboard(chat_id: i64, title: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "Re-enable",
        callbacks::cb_setup(chat_id, title),
    )]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_titles_are_escaped() {
        let text = enabled_text("<b>sneaky</b>", 900);
        assert!(text.contains("&lt;b&gt;sneaky&lt;/b&gt;"));
        assert!(!text.contains("<b>sneaky"));
    }

    #[test]
    fn test_delay_keyboard_layout() {
        let kb = delay_keyboard(555, "Chat");
        // Three preset rows of two plus the Custom/Cancel row
        assert_eq!(kb.inline_keyboard.len(), 4);
        assert!(kb.inline_keyboard[..3].iter().all(|row| row.len() == 2));
        assert_eq!(kb.inline_keyboard[3].len(), 2);
    }

    #[test]
    fn test_chat_list_text() {
        let chats = vec![
            crate::storage::ChatRef {
                chat_id: 555,
                title: "Alpha".to_string(),
            },
            crate::storage::ChatRef {
                chat_id: -100,
                title: "Beta".to_string(),
            },
        ];
        let text = chat_list_text(&chats);
        assert!(text.contains("Alpha : 555"));
        assert!(text.contains("Beta : -100"));
    }
}
