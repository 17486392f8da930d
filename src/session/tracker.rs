use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::{SessionEntry, SessionState, SessionStore, UserKey};

/// Two-step conversation gate: a trigger opens the prompt window, the next
/// text message from the same user closes it.
#[derive(Clone)]
pub struct ConversationTracker {
    store: Arc<dyn SessionStore>,
    ttl: Option<Duration>,
}

impl ConversationTracker {
    pub fn new(store: Arc<dyn SessionStore>, ttl: Option<Duration>) -> Self {
        ConversationTracker { store, ttl }
    }

    /// Expired entries are dropped from the store as they are seen.
    pub fn state(&self, user: UserKey) -> SessionState {
        match self.store.get(user) {
            Some(entry) if self.is_expired(&entry) => {
                self.store.clear(user);
                SessionState::Idle
            }
            Some(entry) => entry.state,
            None => SessionState::Idle,
        }
    }

    pub fn mark_awaiting_prompt(&self, user: UserKey) {
        debug!(user_id = user, "session awaiting prompt");
        self.store
            .set(user, SessionEntry::new(SessionState::AwaitingPrompt));
    }

    /// Returns true exactly once per [`Self::mark_awaiting_prompt`].
    pub fn consume_if_awaiting(&self, user: UserKey) -> bool {
        let Some(entry) = self.store.take(user) else {
            return false;
        };

        match entry.state {
            SessionState::AwaitingPrompt if self.is_expired(&entry) => {
                info!(user_id = user, "prompt window expired");
                false
            }
            SessionState::AwaitingPrompt => true,
            SessionState::Idle => false,
        }
    }

    fn is_expired(&self, entry: &SessionEntry) -> bool {
        match self.ttl {
            Some(ttl) => entry.updated_at.elapsed() >= ttl,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemorySessionStore;

    fn tracker(ttl: Option<Duration>) -> (ConversationTracker, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new());
        (ConversationTracker::new(store.clone(), ttl), store)
    }

    #[test]
    fn unknown_user_is_idle_and_not_consumed() {
        let (tracker, store) = tracker(None);
        assert_eq!(tracker.state(7), SessionState::Idle);
        assert!(!tracker.consume_if_awaiting(7));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn consumes_once_per_trigger() {
        let (tracker, store) = tracker(None);
        tracker.mark_awaiting_prompt(42);
        assert_eq!(tracker.state(42), SessionState::AwaitingPrompt);

        assert!(tracker.consume_if_awaiting(42));
        assert!(!tracker.consume_if_awaiting(42));
        assert_eq!(tracker.state(42), SessionState::Idle);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn repeated_triggers_still_allow_one_prompt() {
        let (tracker, _) = tracker(None);
        tracker.mark_awaiting_prompt(1);
        tracker.mark_awaiting_prompt(1);

        assert!(tracker.consume_if_awaiting(1));
        assert!(!tracker.consume_if_awaiting(1));
    }

    #[test]
    fn users_do_not_share_sessions() {
        let (tracker, _) = tracker(None);
        tracker.mark_awaiting_prompt(1);

        assert!(!tracker.consume_if_awaiting(2));
        assert!(tracker.consume_if_awaiting(1));
    }

    #[test]
    fn reading_an_expired_window_prunes_it() {
        let (tracker, store) = tracker(Some(Duration::ZERO));
        tracker.mark_awaiting_prompt(3);
        assert_eq!(store.len(), 1);

        assert_eq!(tracker.state(3), SessionState::Idle);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn expired_window_is_dropped() {
        let (tracker, store) = tracker(Some(Duration::ZERO));
        tracker.mark_awaiting_prompt(9);

        assert_eq!(tracker.state(9), SessionState::Idle);
        assert!(!tracker.consume_if_awaiting(9));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn concurrent_consumers_see_a_single_acceptance() {
        let (tracker, _) = tracker(None);
        tracker.mark_awaiting_prompt(5);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || tracker.consume_if_awaiting(5))
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|accepted| *accepted)
            .count();

        assert_eq!(accepted, 1);
    }
}
