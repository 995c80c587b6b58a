//! Telegram Bot API channel.
//!
//! Honors `429 Too Many Requests` by sleeping for the server-advised
//! `parameters.retry_after` and trying again, up to [`MAX_ATTEMPTS`]. An
//! advised wait longer than [`MAX_RETRY_AFTER_SECS`] fails the send at once
//! instead of stalling the monitor's cycle.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ChannelError, NotifyChannel};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";
pub const MAX_ATTEMPTS: u32 = 5;
pub const MAX_RETRY_AFTER_SECS: u64 = 60;
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    parameters: Option<ErrorParameters>,
}

#[derive(Deserialize)]
struct ErrorParameters {
    retry_after: Option<u64>,
}

pub struct TelegramChannel {
    api_url: String,
    token: SecretString,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(
        api_url: impl Into<String>,
        token: SecretString,
        chat_id: impl Into<String>,
    ) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
            chat_id: chat_id.into(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_url,
            self.token.expose_secret()
        )
    }
}

/// Escape the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[async_trait]
impl NotifyChannel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, text: &str) -> Result<(), ChannelError> {
        let text = escape_html(text);
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: &text,
            parse_mode: "HTML",
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let response = self.client.post(self.endpoint()).json(&body).send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after_secs = response
                    .json::<ErrorBody>()
                    .await
                    .ok()
                    .and_then(|b| b.parameters)
                    .and_then(|p| p.retry_after)
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                if attempt >= MAX_ATTEMPTS || retry_after_secs > MAX_RETRY_AFTER_SECS {
                    return Err(ChannelError::RateLimited { retry_after_secs });
                }
                warn!(attempt, retry_after_secs, "telegram rate limit, waiting");
                tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
                continue;
            }

            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                let detail: String = detail.chars().take(200).collect();
                return Err(ChannelError::Rejected(format!("HTTP {status}: {detail}")));
            }
            return Ok(());
        }
    }
}
