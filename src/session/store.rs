use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

use super::{SessionState, UserKey};

#[derive(Debug, Clone, Copy)]
pub struct SessionEntry {
    pub state: SessionState,
    pub updated_at: Instant,
}

impl SessionEntry {
    pub fn new(state: SessionState) -> Self {
        SessionEntry {
            state,
            updated_at: Instant::now(),
        }
    }
}

/// Keyed storage for per-user conversation state.
///
/// `take` must remove and return the entry in one step; the tracker relies on
/// it to accept a prompt at most once.
pub trait SessionStore: Send + Sync {
    fn get(&self, user: UserKey) -> Option<SessionEntry>;
    fn set(&self, user: UserKey, entry: SessionEntry);
    fn clear(&self, user: UserKey);
    fn take(&self, user: UserKey) -> Option<SessionEntry>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    entries: Mutex<HashMap<UserKey, SessionEntry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, user: UserKey) -> Option<SessionEntry> {
        self.entries.lock().get(&user).copied()
    }

    fn set(&self, user: UserKey, entry: SessionEntry) {
        self.entries.lock().insert(user, entry);
    }

    fn clear(&self, user: UserKey) {
        self.entries.lock().remove(&user);
    }

    fn take(&self, user: UserKey) -> Option<SessionEntry> {
        self.entries.lock().remove(&user)
    }
}
