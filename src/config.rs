//! Process configuration, built once from environment variables.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default seconds between the end of one cycle and the start of the next.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Default cap on candidate messages fetched per cycle.
const DEFAULT_FETCH_PAGE_SIZE: u32 = 500;

/// Immutable process configuration.
///
/// Loaded once at startup and passed to components at construction; no
/// component reads the environment after this point.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the OAuth client credentials JSON (installed-app flow).
    pub oauth_credentials_file: PathBuf,
    /// Path to the cached authorization token, refreshed in place.
    pub token_cache_file: PathBuf,
    /// Gemini API key.
    pub gemini_api_key: SecretString,
    /// Gemini model name.
    pub gemini_model: String,
    /// Telegram bot token.
    pub telegram_bot_token: SecretString,
    /// Telegram destination chat id.
    pub telegram_chat_id: String,
    /// SQLite database file.
    pub db_file: PathBuf,
    /// Directory extracted attachments are written to.
    pub attachments_dir: PathBuf,
    /// Seconds to sleep after a completed cycle.
    pub poll_interval_secs: u64,
    /// Maximum messages listed per cycle.
    pub fetch_page_size: u32,
}

impl Config {
    /// Build config from environment variables.
    ///
    /// Required: `OAUTH_CREDENTIALS_FILE`, `GEMINI_API_KEY`,
    /// `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`, `DB_FILE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let oauth_credentials_file = require("OAUTH_CREDENTIALS_FILE")?.into();
        let gemini_api_key = SecretString::from(require("GEMINI_API_KEY")?);
        let telegram_bot_token = SecretString::from(require("TELEGRAM_BOT_TOKEN")?);
        let telegram_chat_id = require("TELEGRAM_CHAT_ID")?;
        let db_file = require("DB_FILE")?.into();

        let token_cache_file = std::env::var("TOKEN_CACHE_FILE")
            .unwrap_or_else(|_| "token.json".to_string())
            .into();
        let attachments_dir = std::env::var("ATTACHMENTS_DIR")
            .unwrap_or_else(|_| "attachments".to_string())
            .into();
        let gemini_model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".to_string());

        let poll_interval_secs =
            parse_var("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        let fetch_page_size = parse_var("FETCH_PAGE_SIZE", DEFAULT_FETCH_PAGE_SIZE)?;

        Ok(Self {
            oauth_credentials_file,
            token_cache_file,
            gemini_api_key,
            gemini_model,
            telegram_bot_token,
            telegram_chat_id,
            db_file,
            attachments_dir,
            poll_interval_secs,
            fetch_page_size,
        })
    }
}

fn require(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("cannot parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}
