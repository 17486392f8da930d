use std::time::Duration;

use anyhow::{anyhow, Result};
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ReplyParameters};
use teloxide::RequestError;
use tracing::warn;
use url::Url;

const TELEGRAM_RETRY_ATTEMPTS: usize = 3;

fn telegram_retryable_error(err: &RequestError) -> bool {
    matches!(
        err,
        RequestError::Network(_) | RequestError::RetryAfter(_) | RequestError::Io(_)
    )
}

async fn backoff(err: &RequestError, delay: &mut Duration) {
    if let RequestError::RetryAfter(wait) = err {
        tokio::time::sleep(wait.duration()).await;
    } else {
        tokio::time::sleep(*delay).await;
        *delay *= 2;
    }
}

pub async fn send_text_with_retry(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    reply_to: Option<MessageId>,
) -> Result<Message> {
    let mut delay = Duration::from_secs_f32(1.5);
    let mut attempt = 0;
    loop {
        let mut request = bot.send_message(chat_id, text.to_string());
        if let Some(reply_to) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(reply_to));
        }
        match request.await {
            Ok(message) => return Ok(message),
            Err(err) => {
                attempt += 1;
                if !telegram_retryable_error(&err) || attempt == TELEGRAM_RETRY_ATTEMPTS {
                    return Err(err.into());
                }
                warn!("send_message attempt {attempt} failed: {err}");
                backoff(&err, &mut delay).await;
            }
        }
    }
}

/// Sends the image by reference; Telegram fetches it from `image_url` itself.
pub async fn send_photo_with_retry(
    bot: &Bot,
    chat_id: ChatId,
    image_url: &str,
    caption: &str,
    reply_to: Option<MessageId>,
) -> Result<Message> {
    let url =
        Url::parse(image_url).map_err(|err| anyhow!("invalid image URL {image_url:?}: {err}"))?;
    let mut delay = Duration::from_secs_f32(1.5);
    let mut attempt = 0;
    loop {
        let mut request = bot
            .send_photo(chat_id, InputFile::url(url.clone()))
            .caption(caption.to_string());
        if let Some(reply_to) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(reply_to));
        }
        match request.await {
            Ok(message) => return Ok(message),
            Err(err) => {
                attempt += 1;
                if !telegram_retryable_error(&err) || attempt == TELEGRAM_RETRY_ATTEMPTS {
                    return Err(err.into());
                }
                warn!("send_photo attempt {attempt} failed: {err}");
                backoff(&err, &mut delay).await;
            }
        }
    }
}
