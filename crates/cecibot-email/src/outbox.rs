//! Outbound mail: composing replies and handing them to SMTP.

use cecibot_types::{FileInfo, Response};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutboxError {
    /// A header or address failed to build.
    #[error("failed to compose message: {0}")]
    Compose(#[from] lettre::error::Error),

    /// The recipient address is not a mailbox.
    #[error("invalid recipient address: {0}")]
    Recipient(#[from] lettre::address::AddressError),

    /// The MIME type could not be parsed for the attachment.
    #[error("invalid attachment content type: {0}")]
    ContentType(#[from] lettre::message::header::ContentTypeErr),

    /// SMTP delivery failed.
    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// The artefact could not be read for attaching.
    #[error("failed to read artefact: {0}")]
    Io(#[from] std::io::Error),

    /// The response's opaque payload was not produced by this frontend.
    #[error("malformed opaque payload: {0}")]
    Opaque(#[from] serde_json::Error),
}

/// The correlation payload this frontend puts into each request envelope.
#[derive(Debug, Deserialize)]
pub struct EmailOpaque {
    pub address: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub subject: String,
}

impl EmailOpaque {
    pub fn from_response(response: &Response) -> Result<Self, OutboxError> {
        Ok(serde_json::from_value(response.opaque.clone())?)
    }
}

/// SMTP-backed sender for all outbound traffic (replies, notices, errors).
#[derive(Clone)]
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl Mailer {
    /// Builds a STARTTLS SMTP mailer.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError` when the relay host or the `from` address is
    /// invalid.
    pub fn new(
        smtp_host: &str,
        smtp_port: u16,
        username: &str,
        password: &str,
        from: &str,
    ) -> Result<Self, OutboxError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)?
            .port(smtp_port)
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .build();

        Ok(Self {
            transport,
            from: from.parse()?,
        })
    }

    /// Sends a plain-text reply, threaded onto the original message when a
    /// `Message-ID` is known.
    pub async fn send_text(
        &self,
        to: &str,
        subject: &str,
        in_reply_to: Option<&str>,
        body: &str,
    ) -> Result<(), OutboxError> {
        let message = self
            .builder(to, subject, in_reply_to)?
            .singlepart(SinglePart::plain(body.to_string()))?;
        self.transport.send(message).await?;
        Ok(())
    }

    /// Sends the artefact as an attachment with a short text part.
    pub async fn send_attachment(
        &self,
        to: &str,
        subject: &str,
        in_reply_to: Option<&str>,
        body: &str,
        file: &FileInfo,
    ) -> Result<(), OutboxError> {
        let bytes = tokio::fs::read(&file.path).await?;
        let content_type = ContentType::parse(&file.mime)
            .or_else(|_| ContentType::parse("application/octet-stream"))?;

        let attachment_name = if file.title.is_empty() {
            format!("file{}", file.extension)
        } else {
            file.title.clone()
        };

        let message = self.builder(to, subject, in_reply_to)?.multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(body.to_string()))
                .singlepart(Attachment::new(attachment_name).body(bytes, content_type)),
        )?;
        self.transport.send(message).await?;
        Ok(())
    }

    fn builder(
        &self,
        to: &str,
        subject: &str,
        in_reply_to: Option<&str>,
    ) -> Result<lettre::message::MessageBuilder, OutboxError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject);

        if let Some(id) = in_reply_to {
            builder = builder
                .in_reply_to(id.to_string())
                .references(id.to_string());
        }

        Ok(builder)
    }
}

/// Subject line for a reply to the original mail.
pub fn reply_subject(original: &str) -> String {
    let trimmed = original.trim();
    if trimmed.is_empty() {
        "cecibot".to_string()
    } else if trimmed.to_ascii_lowercase().starts_with("re:") {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}

/// Egress side: relays worker responses back to the sender.
pub struct EmailDeliver {
    mailer: Mailer,
}

impl EmailDeliver {
    pub fn new(mailer: Mailer) -> Self {
        Self { mailer }
    }
}

impl cecibot_frontend::Deliver for EmailDeliver {
    type Error = OutboxError;

    async fn deliver_file(
        &self,
        response: &Response,
        file: &FileInfo,
    ) -> Result<(), OutboxError> {
        let opaque = EmailOpaque::from_response(response)?;
        self.mailer
            .send_attachment(
                &opaque.address,
                &reply_subject(&opaque.subject),
                opaque.message_id.as_deref(),
                &format!("Here is {}", response.url),
                file,
            )
            .await
    }

    async fn deliver_error(&self, response: &Response, message: &str) -> Result<(), OutboxError> {
        let opaque = EmailOpaque::from_response(response)?;
        self.mailer
            .send_text(
                &opaque.address,
                &reply_subject(&opaque.subject),
                opaque.message_id.as_deref(),
                message,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_subjects_are_threaded_not_stacked() {
        assert_eq!(
            reply_subject("https://example.com/"),
            "Re: https://example.com/"
        );
        assert_eq!(reply_subject("Re: already"), "Re: already");
        assert_eq!(reply_subject("RE: shouting"), "RE: shouting");
        assert_eq!(reply_subject("   "), "cecibot");
    }

    #[test]
    fn opaque_round_trips_through_the_envelope() {
        let opaque = serde_json::json!({
            "address": "alice@example.com",
            "message_id": "<id@mail.example>",
            "subject": "https://example.com/",
        });
        let response = Response {
            url: "https://example.com/".to_string(),
            opaque,
            body: cecibot_types::ResponseBody::Error {
                error: cecibot_types::ErrorInfo {
                    message: "timeout".to_string(),
                },
            },
        };

        let decoded = EmailOpaque::from_response(&response).expect("decode");
        assert_eq!(decoded.address, "alice@example.com");
        assert_eq!(decoded.message_id.as_deref(), Some("<id@mail.example>"));
    }
}
