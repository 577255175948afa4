//! Minimal Telegram Bot API client.
//!
//! Only the four calls the frontend needs: `getUpdates` long-polling,
//! `sendMessage`, `sendChatAction` and `sendDocument`. Responses arrive in
//! Telegram's `{ok, result, description}` envelope.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Extra slack on top of the long-poll window before the HTTP client gives
/// up on a `getUpdates` call.
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure talking to the Bot API.
    #[error("telegram api request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The Bot API answered `ok = false`.
    #[error("telegram api rejected the call: {0}")]
    Rejected(String),

    /// The artefact could not be read for upload.
    #[error("failed to read artefact: {0}")]
    Io(#[from] std::io::Error),
}

/// An incoming update. Only `message` updates matter here.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Vec<MessageEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// A span of the message text annotated by Telegram. Offsets and lengths
/// are in UTF-16 code units, not bytes.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

fn unwrap_envelope<T>(envelope: ApiEnvelope<T>) -> Result<T, ApiError> {
    if !envelope.ok {
        return Err(ApiError::Rejected(
            envelope
                .description
                .unwrap_or_else(|| "no description".to_string()),
        ));
    }
    envelope
        .result
        .ok_or_else(|| ApiError::Rejected("ok without result".to_string()))
}

/// Handle to the Bot API for one bot token.
#[derive(Clone)]
pub struct BotApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl BotApi {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// Long-polls for updates after `offset`, blocking server-side for up to
    /// `timeout_seconds`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_seconds: u64,
    ) -> Result<Vec<Update>, ApiError> {
        let envelope = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout_seconds.to_string()),
            ])
            .timeout(Duration::from_secs(timeout_seconds) + LONG_POLL_GRACE)
            .send()
            .await?
            .json::<ApiEnvelope<Vec<Update>>>()
            .await?;
        unwrap_envelope(envelope)
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<(), ApiError> {
        let mut form = vec![
            ("chat_id", chat_id.to_string()),
            ("text", text.to_string()),
        ];
        if let Some(id) = reply_to_message_id {
            form.push(("reply_to_message_id", id.to_string()));
        }

        let envelope = self
            .http
            .post(self.method_url("sendMessage"))
            .form(&form)
            .send()
            .await?
            .json::<ApiEnvelope<serde_json::Value>>()
            .await?;
        unwrap_envelope(envelope).map(|_| ())
    }

    /// Shows "typing…" (or similar) in the chat while the worker grinds.
    pub async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<(), ApiError> {
        let envelope = self
            .http
            .post(self.method_url("sendChatAction"))
            .form(&[("chat_id", chat_id.to_string()), ("action", action.to_string())])
            .send()
            .await?
            .json::<ApiEnvelope<serde_json::Value>>()
            .await?;
        unwrap_envelope(envelope).map(|_| ())
    }

    /// Uploads the artefact as a document, replying to the original message.
    pub async fn send_document(
        &self,
        chat_id: i64,
        reply_to_message_id: Option<i64>,
        path: &Path,
        file_name: &str,
        mime: &str,
    ) -> Result<(), ApiError> {
        let bytes = tokio::fs::read(path).await?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)?;

        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);
        if let Some(id) = reply_to_message_id {
            form = form.text("reply_to_message_id", id.to_string());
        }

        let envelope = self
            .http
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?
            .json::<ApiEnvelope<serde_json::Value>>()
            .await?;
        unwrap_envelope(envelope).map(|_| ())
    }
}
