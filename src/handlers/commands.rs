use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::ReplyParameters;

use crate::config::{HELP_MESSAGE, START_MESSAGE};
use crate::handlers::prompt::build_trigger_keyboard;
use crate::utils::timing::start_command_timer;

/// Greets the user with the trigger button.
pub async fn start_handler(bot: Bot, message: Message) -> Result<()> {
    let mut timer = start_command_timer("start", &message);

    bot.send_message(message.chat.id, START_MESSAGE)
        .reply_markup(build_trigger_keyboard())
        .await?;
    timer.complete("success", None);
    Ok(())
}

pub async fn help_handler(bot: Bot, message: Message) -> Result<()> {
    bot.send_message(message.chat.id, HELP_MESSAGE)
        .reply_parameters(ReplyParameters::new(message.id))
        .await?;
    Ok(())
}
