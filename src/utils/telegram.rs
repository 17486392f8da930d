use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatAction;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// Telegram clears a chat action after roughly five seconds.
const UPLOAD_ACTION_REFRESH: Duration = Duration::from_secs(4);

/// Shows "sending photo..." in the chat for as long as a generation job is
/// being polled. Dropping the indicator stops it.
pub struct UploadPhotoIndicator {
    refresher: JoinHandle<()>,
}

impl UploadPhotoIndicator {
    pub fn start(bot: Bot, chat_id: ChatId) -> Self {
        let refresher = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(UPLOAD_ACTION_REFRESH);
            let mut failures = 0u32;
            loop {
                ticker.tick().await;
                match bot.send_chat_action(chat_id, ChatAction::UploadPhoto).await {
                    Ok(_) => failures = 0,
                    Err(err) => {
                        failures += 1;
                        // Warn once per run of failures.
                        if failures == 1 {
                            warn!(chat_id = chat_id.0, "upload_photo chat action failed: {err}");
                        } else {
                            debug!(chat_id = chat_id.0, failures, "upload_photo chat action failed: {err}");
                        }
                    }
                }
            }
        });

        UploadPhotoIndicator { refresher }
    }
}

impl Drop for UploadPhotoIndicator {
    fn drop(&mut self) {
        self.refresher.abort();
    }
}
