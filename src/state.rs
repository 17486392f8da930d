use crate::generation::ImageGenerator;
use crate::session::ConversationTracker;

#[derive(Clone)]
pub struct AppState {
    pub sessions: ConversationTracker,
    pub generator: ImageGenerator,
}

impl AppState {
    pub fn new(sessions: ConversationTracker, generator: ImageGenerator) -> Self {
        AppState {
            sessions,
            generator,
        }
    }
}
