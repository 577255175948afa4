//! Ingress: long-poll updates, run the submission ladder, answer the user.

use crate::api::{ApiError, BotApi, Message, MessageEntity};
use cecibot_frontend::{Ingress, IngressError, SubmissionOutcome};
use cecibot_types::Identity;
use serde_json::json;
use std::time::Duration;
use tokio::sync::watch;

/// How long to back off after a failed `getUpdates` before polling again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Extracts the spans Telegram annotated as `url` entities.
///
/// Entity offsets are UTF-16 code units, so the text is sliced in UTF-16
/// space; a malformed entity (out of range, split surrogate) is skipped
/// rather than panicking on somebody else's bad annotation.
pub fn extract_links(text: &str, entities: &[MessageEntity]) -> Vec<String> {
    let units: Vec<u16> = text.encode_utf16().collect();

    entities
        .iter()
        .filter(|entity| entity.kind == "url")
        .filter_map(|entity| {
            let end = entity.offset.checked_add(entity.length)?;
            let span = units.get(entity.offset..end)?;
            String::from_utf16(span).ok()
        })
        .collect()
}

/// Long-polls the Bot API and feeds every message through the ingress
/// ladder until `stop` flips.
///
/// # Errors
///
/// Returns `IngressError` only when the queue/KV store fails — fatal, the
/// caller exits non-zero. Bot API hiccups are logged and retried.
pub async fn run_updater(
    api: &BotApi,
    ingress: &Ingress,
    poll_timeout_seconds: u64,
    stop: &mut watch::Receiver<bool>,
) -> Result<(), IngressError> {
    let mut offset: i64 = 0;

    tracing::info!("telegram updater polling for messages");

    loop {
        if *stop.borrow() {
            tracing::info!("telegram updater stopping");
            return Ok(());
        }

        let updates = tokio::select! {
            result = api.get_updates(offset, poll_timeout_seconds) => match result {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::error!(error = %e, "getUpdates failed, retrying");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            },
            _ = stop.changed() => continue,
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };

            handle_message(api, ingress, &message).await?;
        }
    }
}

async fn handle_message(
    api: &BotApi,
    ingress: &Ingress,
    message: &Message,
) -> Result<(), IngressError> {
    let Some(from) = &message.from else {
        return Ok(());
    };
    let text = message.text.as_deref().unwrap_or_default();
    let chat_id = message.chat.id;

    match text.trim() {
        "/start" => {
            reply(api, message, "Welcome to the cecibot!").await;
            return Ok(());
        }
        "/cancel" => {
            reply(api, message, "Sad to see you go!").await;
            return Ok(());
        }
        _ => {}
    }

    let links = extract_links(text, &message.entities);
    let identity = Identity::new(format!("({})", from.id));
    let opaque = json!({
        "chat_id": chat_id,
        "message_id": message.message_id,
    });
    let identifier = json!({
        "user_id": from.id,
        "chat_id": chat_id,
        "message_id": message.message_id,
    });

    match ingress.submit(&links, &identity, opaque, 1, identifier).await? {
        SubmissionOutcome::Enqueued => {
            if let Err(e) = api.send_chat_action(chat_id, "typing").await {
                tracing::debug!(error = %e, "failed to send chat action");
            }
        }
        SubmissionOutcome::NoUrl => reply(api, message, "Send some links!").await,
        SubmissionOutcome::TooManyUrls => {
            reply(api, message, "Send links one message at a time!").await
        }
        SubmissionOutcome::InvalidScheme => {
            reply(api, message, "Links must start with http:// or https://.").await
        }
        SubmissionOutcome::CoolDown { seconds } => {
            reply(
                api,
                message,
                &format!("You are trying too fast! Wait for {seconds} seconds..."),
            )
            .await
        }
        SubmissionOutcome::Silent => {}
    }

    Ok(())
}

/// Replies in-thread; a failed reply is logged, never fatal.
async fn reply(api: &BotApi, message: &Message, text: &str) {
    if let Err(e) = api
        .send_message(message.chat.id, text, Some(message.message_id))
        .await
    {
        tracing::error!(chat_id = message.chat.id, error = %e, "failed to send reply");
    }
}

/// Egress side: sends artefacts and errors back into the originating chat.
pub struct TelegramDeliver {
    api: BotApi,
}

impl TelegramDeliver {
    pub fn new(api: BotApi) -> Self {
        Self { api }
    }

    fn addressing(response: &cecibot_types::Response) -> Result<(i64, i64), ApiError> {
        let opaque: TelegramOpaque = serde_json::from_value(response.opaque.clone())
            .map_err(|e| ApiError::Rejected(format!("malformed opaque payload: {e}")))?;
        Ok((opaque.chat_id, opaque.message_id))
    }
}

#[derive(serde::Deserialize)]
struct TelegramOpaque {
    chat_id: i64,
    message_id: i64,
}

impl cecibot_frontend::Deliver for TelegramDeliver {
    type Error = ApiError;

    async fn deliver_file(
        &self,
        response: &cecibot_types::Response,
        file: &cecibot_types::FileInfo,
    ) -> Result<(), ApiError> {
        let (chat_id, message_id) = Self::addressing(response)?;
        self.api
            .send_document(chat_id, Some(message_id), &file.path, &file.title, &file.mime)
            .await
    }

    async fn deliver_error(
        &self,
        response: &cecibot_types::Response,
        message: &str,
    ) -> Result<(), ApiError> {
        let (chat_id, message_id) = Self::addressing(response)?;
        self.api.send_message(chat_id, message, Some(message_id)).await
    }
}
