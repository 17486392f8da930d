use std::error::Error;
use std::sync::Arc;

use dotenvy::dotenv;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

mod config;
mod generation;
mod handlers;
mod session;
mod state;
mod utils;

use config::{log_level_from_env, Config};
use generation::{ImageGenerator, ModelScopeClient, PollSchedule};
use handlers::{commands, prompt};
use session::{ConversationTracker, InMemorySessionStore};
use state::AppState;
use utils::logging::init_logging;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
enum Command {
    #[command(description = "show the image generation button")]
    Start,
    #[command(description = "show usage")]
    Help,
}

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    let _guards = init_logging(&log_level_from_env());

    let config = match Config::load() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            error!("Configuration error: {err}");
            return Err(err.into());
        }
    };

    let client = ModelScopeClient::new(&config)?;
    let generator = ImageGenerator::new(Arc::new(client), PollSchedule::from(config.as_ref()));
    let sessions = ConversationTracker::new(
        Arc::new(InMemorySessionStore::new()),
        config.prompt_session_ttl,
    );
    let state = AppState::new(sessions, generator);

    let bot = Bot::new(config.bot_token.clone());
    info!(
        model = %config.model_scope_image_model,
        poll_attempts = config.poll_attempts,
        poll_interval_s = config.poll_interval.as_secs(),
        "Starting ModelScope image bot"
    );
    if let Err(err) = bot.set_my_commands(Command::bot_commands()).await {
        error!("Failed to register bot commands: {err}");
    }

    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .endpoint(handle_command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(
            dptree::filter(|msg: Message| {
                msg.text()
                    .is_some_and(|text| !text.trim_start().starts_with('/'))
            })
            .endpoint(handle_text_message),
        )
        .endpoint(ignore_message);

    let callback_handler = Update::filter_callback_query().endpoint(handle_callback_query);

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(callback_handler);

    // Updates from different chats are handled concurrently; each chat's
    // updates arrive in order.
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Bot stopped");
    Ok(())
}

async fn handle_command(bot: Bot, message: Message, command: Command) -> HandlerResult {
    let result = match command {
        Command::Start => commands::start_handler(bot, message).await,
        Command::Help => commands::help_handler(bot, message).await,
    };
    if let Err(err) = result {
        error!("command handler failed: {err}");
    }
    Ok(())
}

async fn handle_callback_query(bot: Bot, state: AppState, query: CallbackQuery) -> HandlerResult {
    if let Err(err) = prompt::trigger_callback(bot, state, query).await {
        error!("trigger callback failed: {err}");
    }
    Ok(())
}

async fn handle_text_message(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    if let Err(err) = prompt::text_message_handler(bot, state, message).await {
        error!("text message handler failed: {err}");
    }
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
