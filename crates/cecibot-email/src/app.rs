//! Inbound-mail webhook and the email ingress ladder.
//!
//! The mail provider POSTs each raw inbound message to
//! `/sns/cecibot-request-bot?key=<secret>`. A wrong key gets `418 I'm a
//! teapot` — a deliberately useless answer for whoever is probing the
//! endpoint. The URL to fetch is taken from the subject line.

use crate::address;
use crate::mail::InboundMail;
use crate::outbox::Mailer;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use cecibot_frontend::{extract_urls, Ingress, IngressError, SubmissionOutcome};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

/// Process-wide shutdown control: one stop flag shared by the server, the
/// egress loop and the signal handler, plus a marker distinguishing "asked
/// to stop" from "died of a fatal ingress error".
pub struct Shutdown {
    stop: watch::Sender<bool>,
    fatal: AtomicBool,
}

impl Shutdown {
    pub fn new() -> (Arc<Self>, watch::Receiver<bool>) {
        let (stop, stop_rx) = watch::channel(false);
        (
            Arc::new(Self {
                stop,
                fatal: AtomicBool::new(false),
            }),
            stop_rx,
        )
    }

    /// Graceful stop (SIGINT/SIGTERM).
    pub fn request(&self) {
        let _ = self.stop.send(true);
    }

    /// Fatal stop: the process should exit non-zero so the supervisor
    /// restarts it.
    pub fn fail(&self) {
        self.fatal.store(true, Ordering::SeqCst);
        let _ = self.stop.send(true);
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }
}

/// Shared state behind the webhook.
pub struct AppState {
    pub ingress: Ingress,
    pub mailer: Mailer,
    pub webhook_key: String,
    pub shutdown: Arc<Shutdown>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sns/cecibot-request-bot", post(inbound_mail))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct WebhookQuery {
    #[serde(default)]
    key: Option<String>,
}

fn authorized(presented: Option<&str>, expected: &str) -> bool {
    presented == Some(expected)
}

async fn inbound_mail(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> StatusCode {
    if !authorized(query.key.as_deref(), &state.webhook_key) {
        return StatusCode::IM_A_TEAPOT;
    }

    let Some(mail) = InboundMail::parse(&body) else {
        tracing::warn!("discarding unparseable inbound mail");
        return StatusCode::BAD_REQUEST;
    };

    match handle_mail(&state, &mail).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::error!(error = %e, "ingress failed fatally");
            state.shutdown.fail();
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn handle_mail(state: &AppState, mail: &InboundMail) -> Result<(), IngressError> {
    let Some(identity) = address::identity_for(&mail.address) else {
        // No reply either: an address this malformed cannot be rate-limited,
        // so answering it would be an open amplifier.
        tracing::warn!(address = %mail.address, "dropping mail from unusable sender address");
        return Ok(());
    };

    let urls = extract_urls(&mail.subject);
    let opaque = json!({
        "address": mail.address,
        "message_id": mail.message_id,
        "subject": mail.subject,
    });
    let identifier = json!({
        "address": mail.address,
        "message_id": mail.message_id,
    });

    let outcome = state
        .ingress
        .submit(&urls, &identity, opaque, 1, identifier)
        .await?;

    match outcome {
        SubmissionOutcome::Enqueued | SubmissionOutcome::Silent => {}
        SubmissionOutcome::NoUrl => {
            notice(state, mail, "Send exactly one URL in the subject line.").await
        }
        SubmissionOutcome::TooManyUrls => {
            notice(state, mail, "Send one URL at a time, in the subject line.").await
        }
        SubmissionOutcome::InvalidScheme => {
            notice(state, mail, "Only http:// and https:// URLs are supported.").await
        }
        SubmissionOutcome::CoolDown { seconds } => {
            notice(
                state,
                mail,
                &format!("You are trying too fast! Wait for {seconds} seconds..."),
            )
            .await
        }
    }

    Ok(())
}

/// Sends a one-line notice back to the sender; failures are logged, never
/// fatal.
async fn notice(state: &AppState, mail: &InboundMail, text: &str) {
    let subject = crate::outbox::reply_subject(&mail.subject);
    if let Err(e) = state
        .mailer
        .send_text(&mail.address, &subject, mail.message_id.as_deref(), text)
        .await
    {
        tracing::error!(address = %mail.address, error = %e, "failed to send notice");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_comparison_is_exact() {
        assert!(authorized(Some("sekrit"), "sekrit"));
        assert!(!authorized(Some("sekrit "), "sekrit"));
        assert!(!authorized(Some(""), "sekrit"));
        assert!(!authorized(None, "sekrit"));
    }
}
