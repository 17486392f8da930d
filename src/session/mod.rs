pub mod store;
pub mod tracker;

pub use store::{InMemorySessionStore, SessionEntry, SessionStore};
pub use tracker::ConversationTracker;

/// Telegram user id; sessions are per user, not per chat.
pub type UserKey = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingPrompt,
}
