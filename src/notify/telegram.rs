//! Telegram Bot API client (send-only plus update polling for discovery).
//!
//! Uses plain form posts rather than a bot framework: the bridge never runs
//! a dispatcher, it only needs `sendMessage` and a one-shot `getUpdates`.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{NotificationApi, NotifyError, Recipient};

/// Public Bot API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Maximum bytes of an error body kept in [`NotifyError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Telegram Bot API client.
pub struct TelegramApi {
    client: reqwest::Client,
    bot_base: String,
}

impl std::fmt::Debug for TelegramApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramApi")
            .field("bot_base", &"[REDACTED]")
            .finish()
    }
}

/// `getUpdates` envelope.
#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
    #[serde(default)]
    description: Option<String>,
}

/// The subset of an update that can carry a chat.
#[derive(Debug, Deserialize)]
struct Update {
    #[serde(default)]
    message: Option<InboundMessage>,
    #[serde(default)]
    edited_message: Option<InboundMessage>,
    #[serde(default)]
    channel_post: Option<InboundMessage>,
    #[serde(default)]
    edited_channel_post: Option<InboundMessage>,
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    #[serde(default)]
    chat: Option<Chat>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

impl Update {
    fn chat_ids(&self) -> impl Iterator<Item = i64> + '_ {
        [
            &self.message,
            &self.edited_message,
            &self.channel_post,
            &self.edited_channel_post,
        ]
        .into_iter()
        .filter_map(|m| m.as_ref()?.chat.as_ref().map(|c| c.id))
    }
}

impl TelegramApi {
    /// Build a client for `token` against `api_base`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the HTTP client cannot be built.
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            bot_base: format!("{}/bot{token}", api_base.trim_end_matches('/')),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.bot_base)
    }
}

#[async_trait]
impl NotificationApi for TelegramApi {
    async fn send_message(&self, recipient: &Recipient, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.endpoint("sendMessage"))
            .form(&[("chat_id", recipient.as_str()), ("text", text)])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }
        debug!(recipient = %recipient, "telegram message accepted");
        Ok(())
    }

    async fn discover_recipients(&self) -> Result<Vec<Recipient>, NotifyError> {
        let response = self
            .client
            .get(self.endpoint("getUpdates"))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let recipients = parse_updates(&body)?;
        debug!(count = recipients.len(), "chats discovered from getUpdates");
        Ok(recipients)
    }
}

/// Extract the distinct chat ids from a `getUpdates` body, in ascending order.
///
/// # Errors
///
/// Returns [`NotifyError::Malformed`] if the body is not an update envelope
/// or reports `ok: false`.
pub fn parse_updates(body: &str) -> Result<Vec<Recipient>, NotifyError> {
    let parsed: UpdatesResponse =
        serde_json::from_str(body).map_err(|e| NotifyError::Malformed(e.to_string()))?;

    if !parsed.ok {
        return Err(NotifyError::Malformed(
            parsed
                .description
                .unwrap_or_else(|| "getUpdates returned ok=false".to_owned()),
        ));
    }

    let ids: BTreeSet<i64> = parsed.result.iter().flat_map(|u| u.chat_ids()).collect();
    Ok(ids.into_iter().map(|id| Recipient::new(id.to_string())).collect())
}

/// Drop the request URL from a transport error: it embeds the bot token.
fn transport_error(e: reqwest::Error) -> NotifyError {
    NotifyError::Http(e.without_url())
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_owned();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    format!("{}...", &text[..end])
}
