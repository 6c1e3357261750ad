//! Bot API HTTP client.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::telegram::types::{ApiResponse, SendMessageRequest, SendPhotoRequest};

/// Longest text a single message may carry.
pub const MAX_MESSAGE_LEN: usize = 4096;

pub type TelegramResult<T> = Result<T, TelegramError>;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("{method} failed ({status}): {description}")]
    Api {
        method: &'static str,
        status: u16,
        description: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl TelegramError {
    /// The Bot API rejected the request itself; sending it again cannot succeed.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Api { status, .. } => (400..500).contains(status) && *status != 429,
            Self::Network(_) => false,
        }
    }
}

/// Telegram bot configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token; comes from the environment only
    pub bot_token: String,
    /// Bot API base URL
    pub api_base: String,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` on webhook calls
    pub webhook_secret: Option<String>,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: "https://api.telegram.org".to_string(),
            webhook_secret: None,
            timeout: Duration::from_secs(15),
        }
    }
}

impl TelegramConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bot_token: std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            api_base: std::env::var("TELEGRAM_API_BASE")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            webhook_secret: std::env::var("TELEGRAM_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            timeout: std::env::var("TELEGRAM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty()
    }
}

/// Client for the Bot API methods the bot uses.
pub struct TelegramClient {
    http: Client,
    config: TelegramConfig,
}

impl TelegramClient {
    pub fn new(config: TelegramConfig) -> TelegramResult<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }

    /// Send Markdown text, split into several messages when it is too long.
    pub async fn send_message(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> TelegramResult<()> {
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let request = SendMessageRequest {
                chat_id,
                text: chunk,
                reply_to_message_id: reply_to,
                parse_mode: "Markdown",
            };
            self.call("sendMessage", &request).await?;
        }
        Ok(())
    }

    /// Send a photo the Bot API fetches from `photo_url`.
    pub async fn send_photo(&self, chat_id: i64, photo_url: &str, caption: Option<&str>) -> TelegramResult<()> {
        let request = SendPhotoRequest {
            chat_id,
            photo: photo_url,
            caption,
        };
        self.call("sendPhoto", &request).await
    }

    async fn call<T: Serialize>(&self, method: &'static str, body: &T) -> TelegramResult<()> {
        // The URL embeds the token; never log it.
        let url = format!("{}/bot{}/{}", self.config.api_base, self.config.bot_token, method);
        let response = self.http.post(&url).json(body).send().await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let parsed: Option<ApiResponse> = serde_json::from_str(&text).ok();

        match parsed {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => {
                debug!(method, "Bot API call succeeded");
                Ok(())
            }
            Some(ApiResponse { description, .. }) => Err(TelegramError::Api {
                method,
                status: status.as_u16(),
                description: description.unwrap_or_else(|| status.to_string()),
            }),
            None => Err(TelegramError::Api {
                method,
                status: status.as_u16(),
                description: text,
            }),
        }
    }
}

/// Escape the characters legacy Markdown treats as entity markers.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Split `text` into pieces of at most `max_chars` characters.
pub fn split_message(text: &str, max_chars: usize) -> Vec<&str> {
    if text.is_empty() || max_chars == 0 {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let end = rest
            .char_indices()
            .nth(max_chars)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        let (chunk, tail) = rest.split_at(end);
        chunks.push(chunk);
        rest = tail;
    }
    chunks
}
