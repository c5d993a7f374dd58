//! Media Sweeper: a Telegram bot that deletes media messages in watched
//! groups and channels after a configurable delay.
//!
//! The core is a periodic sweep over a persisted per-chat ledger of
//! (message id, observed-at) records: expired records are deleted against
//! the Bot API in batches, failed batches stay pending, and only confirmed
//! ids are removed from the ledger.

#![deny(missing_docs)]

/// Telegram handlers, permission guards, and UI views
pub mod bot;
/// Settings and tunable constants
pub mod config;
/// Ledger and user-index persistence
pub mod storage;
/// Periodic sweep scheduler and batched deleter
pub mod sweep;
/// In-memory test doubles
pub mod testing;
/// Telegram API retry helpers
pub mod utils;
/// Enable/disable/list operations over watched chats
pub mod watchlist;
