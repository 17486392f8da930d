use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::generation::orchestrator::{DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL};

pub const DEFAULT_MODEL_SCOPE_BASE_URL: &str = "https://api-inference.modelscope.ai/";
pub const DEFAULT_MODEL_SCOPE_IMAGE_MODEL: &str = "DiffSynth-Studio/Z-Image-Turbo-DistillPatch";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set in the environment")]
    Missing(&'static str),
    #[error("{name} is not a valid URL: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub model_scope_api_key: String,
    pub model_scope_base_url: Url,
    pub model_scope_image_model: String,
    pub poll_attempts: u32,
    pub poll_interval: Duration,
    pub http_timeout: Duration,
    pub prompt_session_ttl: Option<Duration>,
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_required(names: &[&'static str]) -> Result<String, ConfigError> {
    for name in names {
        if let Ok(value) = env::var(name) {
            if !value.trim().is_empty() {
                return Ok(value.trim().to_string());
            }
        }
    }
    Err(ConfigError::Missing(names[0]))
}

/// The service paths are joined relative to the base, so it must end with a slash.
fn normalize_base_url(value: &str) -> Result<Url, ConfigError> {
    let mut value = value.trim().to_string();
    if !value.ends_with('/') {
        value.push('/');
    }
    Url::parse(&value).map_err(|source| ConfigError::InvalidUrl {
        name: "MODEL_SCOPE_BASE_URL",
        source,
    })
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let model_scope_api_key = env_required(&["MODEL_SCOPE_API_KEY"])?;
        let bot_token = env_required(&["TELEGRAM_BOT_TOKEN", "BOT_TOKEN"])?;

        let mut poll_attempts = env_u32("GENERATION_POLL_ATTEMPTS", DEFAULT_POLL_ATTEMPTS);
        if poll_attempts == 0 {
            warn!("GENERATION_POLL_ATTEMPTS must be positive; using {DEFAULT_POLL_ATTEMPTS}.");
            poll_attempts = DEFAULT_POLL_ATTEMPTS;
        }

        let ttl_seconds = env_u64("PROMPT_SESSION_TTL_SECONDS", 0);

        Ok(Config {
            bot_token,
            model_scope_api_key,
            model_scope_base_url: normalize_base_url(&env_string(
                "MODEL_SCOPE_BASE_URL",
                DEFAULT_MODEL_SCOPE_BASE_URL,
            ))?,
            model_scope_image_model: env_string(
                "MODEL_SCOPE_IMAGE_MODEL",
                DEFAULT_MODEL_SCOPE_IMAGE_MODEL,
            ),
            poll_attempts,
            poll_interval: Duration::from_secs(env_u64(
                "GENERATION_POLL_INTERVAL_SECONDS",
                DEFAULT_POLL_INTERVAL.as_secs(),
            )),
            http_timeout: Duration::from_secs(env_u64("HTTP_TIMEOUT_SECONDS", 30).max(1)),
            prompt_session_ttl: (ttl_seconds > 0).then(|| Duration::from_secs(ttl_seconds)),
        })
    }
}

/// Read separately from [`Config::load`] so logging is up before config errors are reported.
pub fn log_level_from_env() -> String {
    env_string("LOG_LEVEL", "info").to_lowercase()
}

pub const START_MESSAGE: &str = "Hi! I am an image generation bot. Tap the button below and send me a description of the picture you want.";

pub const HELP_MESSAGE: &str = "Commands:\n/start - show the image generation button\n/help - show this message\n\nTap \"Generate image\", then send a text prompt. Generation usually takes under a minute.";

pub const PROMPT_REQUEST_MESSAGE: &str = "Please send the text to generate an image from:";

pub const PRESS_BUTTON_FIRST_MESSAGE: &str = "Tap \"Generate image\" to get started.";

pub const GENERATION_FAILED_MESSAGE: &str =
    "Couldn't generate the image. Please try again.";

pub const GENERATION_ERROR_MESSAGE: &str =
    "Something went wrong while generating the image. Please try again later.";

pub const IMAGE_CAPTION: &str = "Your generated image:";
