use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ReplyParameters,
};
use tracing::{error, info, warn};

use crate::config::{
    GENERATION_ERROR_MESSAGE, GENERATION_FAILED_MESSAGE, IMAGE_CAPTION,
    PRESS_BUTTON_FIRST_MESSAGE, PROMPT_REQUEST_MESSAGE,
};
use crate::generation::JobStatus;
use crate::handlers::responses::{send_photo_with_retry, send_text_with_retry};
use crate::session::{ConversationTracker, UserKey};
use crate::state::AppState;
use crate::utils::telegram::UploadPhotoIndicator;
use crate::utils::timing::{start_command_timer, CommandTimer};

pub const GENERATE_IMAGE_CALLBACK: &str = "generate_image";
const GENERATE_IMAGE_BUTTON_TEXT: &str = "Generate image";
// Telegram rejects text messages over 4096 characters.
const ACK_PROMPT_PREVIEW_CHARS: usize = 200;

pub fn build_trigger_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        GENERATE_IMAGE_BUTTON_TEXT,
        GENERATE_IMAGE_CALLBACK,
    )]])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptDecision {
    Generate(String),
    NeedsTrigger,
}

fn acknowledgement_text(prompt: &str) -> String {
    let mut preview: String = prompt.chars().take(ACK_PROMPT_PREVIEW_CHARS).collect();
    if prompt.chars().count() > ACK_PROMPT_PREVIEW_CHARS {
        preview.push_str("...");
    }
    format!("Starting image generation for: '{preview}'. This may take a while...")
}

/// Consumes the user's prompt window if one is open.
pub fn classify_text_message(
    sessions: &ConversationTracker,
    user: UserKey,
    text: &str,
) -> PromptDecision {
    if sessions.consume_if_awaiting(user) {
        PromptDecision::Generate(text.to_string())
    } else {
        PromptDecision::NeedsTrigger
    }
}

pub async fn trigger_callback(bot: Bot, state: AppState, query: CallbackQuery) -> Result<()> {
    if let Err(err) = bot.answer_callback_query(query.id.clone()).await {
        warn!("answer_callback_query failed: {err}");
    }
    if query.data.as_deref() != Some(GENERATE_IMAGE_CALLBACK) {
        return Ok(());
    }

    let user_id = query.from.id.0;
    let previous = state.sessions.state(user_id);
    state.sessions.mark_awaiting_prompt(user_id);
    info!(user_id, previous = ?previous, "Prompt window opened");

    match query.message.as_ref() {
        Some(message) => {
            bot.edit_message_text(message.chat().id, message.id(), PROMPT_REQUEST_MESSAGE)
                .await?;
        }
        None => {
            bot.send_message(ChatId::from(query.from.id), PROMPT_REQUEST_MESSAGE)
                .await?;
        }
    }
    Ok(())
}

/// Routes a plain text message. An accepted prompt is acknowledged and
/// generated on its own task, so a failed acknowledgement never drops it.
pub async fn text_message_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let (Some(user), Some(text)) = (message.from.as_ref(), message.text()) else {
        return Ok(());
    };
    let user_id = user.id.0;

    match classify_text_message(&state.sessions, user_id, text) {
        PromptDecision::NeedsTrigger => {
            bot.send_message(message.chat.id, PRESS_BUTTON_FIRST_MESSAGE)
                .reply_parameters(ReplyParameters::new(message.id))
                .await?;
        }
        PromptDecision::Generate(prompt) => {
            let timer = start_command_timer("generate_image", &message);
            let chat_id = message.chat.id;
            let reply_to = message.id;
            tokio::spawn(async move {
                let ack = acknowledgement_text(&prompt);
                if let Err(err) = send_text_with_retry(&bot, chat_id, &ack, Some(reply_to)).await {
                    warn!(user_id, "Failed to acknowledge prompt: {err}");
                }
                run_generation(bot, state, chat_id, reply_to, user_id, prompt, timer).await;
            });
        }
    }
    Ok(())
}

async fn run_generation(
    bot: Bot,
    state: AppState,
    chat_id: ChatId,
    reply_to: MessageId,
    user_id: UserKey,
    prompt: String,
    mut timer: CommandTimer,
) {
    let _uploading = UploadPhotoIndicator::start(bot.clone(), chat_id);

    let (reply, status, detail) = match state.generator.generate(&prompt).await {
        Ok(job) => match job.image_url() {
            Some(url) => {
                let sent = send_photo_with_retry(&bot, chat_id, url, IMAGE_CAPTION, Some(reply_to))
                    .await;
                match sent {
                    Ok(_) => {
                        timer.complete("success", Some(job.task_id.clone()));
                        return;
                    }
                    Err(err) => {
                        error!(user_id, task_id = %job.task_id, "Failed to deliver generated image: {err}");
                        (GENERATION_ERROR_MESSAGE, "error", Some(err.to_string()))
                    }
                }
            }
            None => {
                let outcome = match &job.status {
                    JobStatus::Failed => "failed".to_string(),
                    JobStatus::TimedOut => "timed_out".to_string(),
                    JobStatus::Succeeded(None) => "empty_output".to_string(),
                    JobStatus::Unknown(raw) => format!("unknown_status:{raw}"),
                    JobStatus::Pending | JobStatus::Running | JobStatus::Succeeded(Some(_)) => {
                        "incomplete".to_string()
                    }
                };
                warn!(user_id, task_id = %job.task_id, prompt = %job.prompt, outcome = %outcome, "No image produced");
                (GENERATION_FAILED_MESSAGE, "no_image", Some(outcome))
            }
        },
        Err(err) => {
            error!(user_id, "Image generation error: {err}");
            (GENERATION_ERROR_MESSAGE, "error", Some(err.to_string()))
        }
    };

    if let Err(err) = send_text_with_retry(&bot, chat_id, reply, Some(reply_to)).await {
        error!(user_id, "Failed to send generation failure reply: {err}");
    }
    timer.complete(status, detail);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::session::InMemorySessionStore;

    fn sessions() -> ConversationTracker {
        ConversationTracker::new(Arc::new(InMemorySessionStore::new()), None)
    }

    #[test]
    fn text_without_trigger_asks_for_the_button() {
        let sessions = sessions();
        for text in ["hello", "a red fox", ""] {
            assert_eq!(
                classify_text_message(&sessions, 11, text),
                PromptDecision::NeedsTrigger
            );
        }
    }

    #[test]
    fn text_after_trigger_is_the_prompt_once() {
        let sessions = sessions();
        sessions.mark_awaiting_prompt(11);

        assert_eq!(
            classify_text_message(&sessions, 11, "a red fox"),
            PromptDecision::Generate("a red fox".to_string())
        );
        assert_eq!(
            classify_text_message(&sessions, 11, "another fox"),
            PromptDecision::NeedsTrigger
        );
    }

    #[test]
    fn acknowledgement_echoes_short_prompts_whole() {
        assert_eq!(
            acknowledgement_text("a red fox"),
            "Starting image generation for: 'a red fox'. This may take a while..."
        );
    }

    #[test]
    fn acknowledgement_for_maximum_length_prompt_fits_a_message() {
        let prompt = "ж".repeat(4096);
        let text = acknowledgement_text(&prompt);

        assert!(text.chars().count() < 4096);
        assert!(text.contains(&format!("'{}...'", "ж".repeat(ACK_PROMPT_PREVIEW_CHARS))));
    }

    #[test]
    fn trigger_keyboard_has_one_generate_button() {
        let keyboard = build_trigger_keyboard();
        assert_eq!(keyboard.inline_keyboard.len(), 1);
        assert_eq!(keyboard.inline_keyboard[0].len(), 1);
        assert_eq!(keyboard.inline_keyboard[0][0].text, GENERATE_IMAGE_BUTTON_TEXT);
    }
}
