use std::{fmt, time::Duration};

use async_trait::async_trait;
use bot_api::Messenger;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use shared::{domain::ChatId, protocol::Reply};
use thiserror::Error;
use tracing::debug;
use url::Url;

pub mod types;

pub use types::{InlineKeyboardMarkup, TgUser, Update};

use types::{AnswerCallbackQueryRequest, ApiResponse, GetUpdatesRequest, SendMessageRequest};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";
/// Bot API rejects longer `sendMessage` bodies.
pub const MAX_MESSAGE_CHARS: usize = 4096;
const ALLOWED_UPDATES: &[&str] = &["message", "callback_query"];

#[derive(Debug, Error)]
pub enum TelegramError {
    /// Transport failure. The request URL is stripped since it embeds the token.
    #[error("telegram request failed: {0}")]
    Http(reqwest::Error),
    #[error("telegram api error {code}: {description}")]
    Api { code: i64, description: String },
    #[error("invalid telegram api url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("telegram api returned ok without a result")]
    EmptyResult,
}

impl From<reqwest::Error> for TelegramError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.without_url())
    }
}

#[derive(Clone)]
pub struct TelegramConfig {
    pub api_url: String,
    pub token: String,
    /// Bound on ordinary calls; long polls add their own wait on top.
    pub request_timeout: Duration,
}

impl TelegramConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: token.into(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Thin JSON client for the handful of Bot API methods the bot uses.
#[derive(Clone)]
pub struct TelegramClient {
    http: Client,
    base: Url,
    request_timeout: Duration,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, TelegramError> {
        let base = Url::parse(&format!(
            "{}/bot{}/",
            config.api_url.trim_end_matches('/'),
            config.token
        ))?;
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            base,
            request_timeout: config.request_timeout,
        })
    }

    pub async fn get_me(&self) -> Result<TgUser, TelegramError> {
        self.call("getMe", &serde_json::json!({}), self.request_timeout)
            .await
    }

    /// Long-polls for updates after `offset`, waiting up to `wait` server-side.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        wait: Duration,
    ) -> Result<Vec<Update>, TelegramError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: wait.as_secs(),
            allowed_updates: ALLOWED_UPDATES,
        };
        self.call("getUpdates", &request, wait + self.request_timeout)
            .await
    }

    pub async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError> {
        let request = SendMessageRequest {
            chat_id: chat_id.0,
            text,
            reply_markup: markup,
        };
        let _: serde_json::Value = self
            .call("sendMessage", &request, self.request_timeout)
            .await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_id: &str) -> Result<(), TelegramError> {
        let request = AnswerCallbackQueryRequest {
            callback_query_id: callback_id,
        };
        let _: bool = self
            .call("answerCallbackQuery", &request, self.request_timeout)
            .await?;
        Ok(())
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Duration) -> Result<T, TelegramError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.base.join(method)?;
        let response = self
            .http
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        // Error statuses still carry the JSON envelope with a description.
        let envelope: ApiResponse<T> = match response.json().await {
            Ok(envelope) => envelope,
            Err(err) if status.is_success() => return Err(err.into()),
            Err(_) => {
                return Err(TelegramError::Api {
                    code: i64::from(status.as_u16()),
                    description: status.to_string(),
                })
            }
        };
        if !envelope.ok {
            return Err(TelegramError::Api {
                code: envelope
                    .error_code
                    .unwrap_or_else(|| i64::from(status.as_u16())),
                description: envelope.description.unwrap_or_default(),
            });
        }
        debug!(method, "telegram call succeeded");
        envelope.result.ok_or(TelegramError::EmptyResult)
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send(&self, chat_id: ChatId, reply: &Reply) -> anyhow::Result<()> {
        let markup = reply.keyboard.as_ref().map(InlineKeyboardMarkup::from);
        let chunks = split_text(&reply.text, MAX_MESSAGE_CHARS);
        let last = chunks.len().saturating_sub(1);
        for (index, chunk) in chunks.iter().enumerate() {
            // The keyboard rides on the final chunk so it stays under the text.
            let keyboard = if index == last { markup.as_ref() } else { None };
            self.send_message(chat_id, chunk, keyboard).await?;
        }
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> anyhow::Result<()> {
        self.answer_callback_query(callback_id).await?;
        Ok(())
    }
}

/// Splits `text` into pieces of at most `limit` characters, preferring line breaks.
pub fn split_text(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current).trim_end_matches('\n').to_string());
            current_len = 0;
        }
        if line_len > limit {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                chunks.push(piece.iter().collect::<String>().trim_end_matches('\n').to_string());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current.trim_end_matches('\n').to_string());
    }
    chunks.retain(|chunk| !chunk.is_empty());
    chunks
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
