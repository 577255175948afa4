//! Inbound mail parsing.
//!
//! The webhook delivers the raw RFC 5322 message; all the frontend needs
//! from it is who sent it, what the subject says, and the `Message-ID` for
//! reply threading.

use mail_parser::MessageParser;

/// The slice of an inbound message the ingress ladder consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMail {
    /// Sender address from the `From` header.
    pub address: String,
    /// Decoded subject line, empty when absent.
    pub subject: String,
    /// `Message-ID` for `In-Reply-To`/`References` threading, if present.
    pub message_id: Option<String>,
}

impl InboundMail {
    /// Parses a raw message. Returns `None` when the bytes are not parseable
    /// mail or carry no usable sender address.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let message = MessageParser::default().parse(raw)?;

        let address = message
            .from()
            .and_then(|from| from.first())
            .and_then(|addr| addr.address.as_deref())
            .map(str::to_string)?;

        let subject = message.subject().unwrap_or_default().to_string();
        let message_id = message.message_id().map(str::to_string);

        Some(Self {
            address,
            subject,
            message_id,
        })
    }
}
