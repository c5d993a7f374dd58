/// Cached admin-status permission guards
pub mod admin_cache;
/// Callback payload parsing and dispatch
pub mod callbacks;
/// Command and message handlers, including the ingestion hook
pub mod handlers;
/// Pending custom-time prompts
pub mod pending;
/// Keyboards and message texts
pub mod views;

pub use admin_cache::AdminCache;
pub use pending::PendingActions;
