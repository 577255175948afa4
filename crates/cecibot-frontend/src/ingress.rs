//! The ingress decision: validate, rate-limit, enqueue, audit.

use cecibot_audit::RequestLogger;
use cecibot_bus::{Bus, BusError};
use cecibot_ratelimit::{RateLimitError, RateLimitStatus, RateLimiter};
use cecibot_types::{has_supported_scheme, Identity, Request};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// What ingress decided about one platform message.
///
/// Everything except `Enqueued` and `Silent` warrants a user-visible reply;
/// the wording is the frontend's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The request is on the queue; a response will arrive on the medium's
    /// response list.
    Enqueued,
    /// The message contained no URL.
    NoUrl,
    /// The message contained more than one URL.
    TooManyUrls,
    /// The URL does not start with `http://` or `https://`.
    InvalidScheme,
    /// First rejected attempt inside the cool-down window. Tell the user to
    /// wait `seconds` — once; later attempts come back as `Silent`.
    CoolDown { seconds: u64 },
    /// Rate-limited again or blacklisted. Reply with nothing (a reply per
    /// attempt would hand an amplifier to whoever is hammering us).
    Silent,
}

/// Errors fatal to the ingress task.
///
/// These all mean the KV store is unreachable or broken; the task should
/// exit non-zero and let the supervisor restart the process.
#[derive(Debug, Error)]
pub enum IngressError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
}

/// The pure half of the ingress ladder: exactly one URL, supported scheme.
/// Runs before the rate limiter so malformed messages do not burn cool-down
/// attempts.
fn validate(urls: &[String]) -> Result<&String, SubmissionOutcome> {
    let url = match urls {
        [] => return Err(SubmissionOutcome::NoUrl),
        [url] => url,
        _ => return Err(SubmissionOutcome::TooManyUrls),
    };

    if !has_supported_scheme(url) {
        return Err(SubmissionOutcome::InvalidScheme);
    }

    Ok(url)
}

/// Shared ingress state for one medium.
#[derive(Clone)]
pub struct Ingress {
    bus: Bus,
    limiter: RateLimiter,
    audit: Arc<Mutex<RequestLogger>>,
    medium: String,
}

impl Ingress {
    pub fn new(
        bus: Bus,
        limiter: RateLimiter,
        audit: Arc<Mutex<RequestLogger>>,
        medium: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            limiter,
            audit,
            medium: medium.into(),
        }
    }

    /// Runs the full ingress ladder for one platform message.
    ///
    /// `urls` holds every URL the platform extraction found in the message;
    /// validation happens before the rate limiter is consulted, so malformed
    /// messages do not burn cool-down attempts.
    ///
    /// # Errors
    ///
    /// Returns `IngressError` only for KV/bus failures (fatal, see
    /// [`IngressError`]). Every per-message condition is a
    /// [`SubmissionOutcome`].
    pub async fn submit(
        &self,
        urls: &[String],
        identity: &Identity,
        opaque: serde_json::Value,
        identifier_version: u32,
        identifier: serde_json::Value,
    ) -> Result<SubmissionOutcome, IngressError> {
        let url = match validate(urls) {
            Ok(url) => url,
            Err(outcome) => return Ok(outcome),
        };

        match self.limiter.check(identity).await? {
            RateLimitStatus::Free => {}
            RateLimitStatus::RateLimitedNow => {
                return Ok(SubmissionOutcome::CoolDown {
                    seconds: self.limiter.cool_down_seconds(),
                });
            }
            RateLimitStatus::RateLimitedAgain | RateLimitStatus::Blacklisted => {
                return Ok(SubmissionOutcome::Silent);
            }
        }

        let request = Request {
            url: url.clone(),
            medium: self.medium.clone(),
            opaque,
            identifier_version,
            identifier,
        };

        self.bus.push_request(&request).await?;
        tracing::info!(url = %request.url, medium = %self.medium, "request enqueued");

        self.audit_tap(&request).await;

        Ok(SubmissionOutcome::Enqueued)
    }

    /// Mirrors the enqueued request into the audit log. Failures are logged
    /// and swallowed; the request is already on the queue.
    async fn audit_tap(&self, request: &Request) {
        let audit = Arc::clone(&self.audit);
        let url = request.url.clone();
        let medium = request.medium.clone();
        let identifier_version = request.identifier_version;
        let identifier = request.identifier.clone();

        let result = tokio::task::spawn_blocking(move || {
            let mut logger = audit.lock().unwrap_or_else(|e| e.into_inner());
            logger.log(&url, &medium, identifier_version, &identifier)
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "failed to write audit row"),
            Err(e) => tracing::error!(error = %e, "audit task panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The enqueue path needs a live Redis and is covered by the ignored
    // integration tests; the ladder before any I/O is pure and tested here.

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn zero_urls_are_rejected() {
        assert_eq!(validate(&urls(&[])), Err(SubmissionOutcome::NoUrl));
    }

    #[test]
    fn multiple_urls_are_rejected() {
        assert_eq!(
            validate(&urls(&["https://a.example/", "https://b.example/"])),
            Err(SubmissionOutcome::TooManyUrls)
        );
    }

    #[test]
    fn unsupported_schemes_are_rejected() {
        assert_eq!(
            validate(&urls(&["ftp://example.com/file"])),
            Err(SubmissionOutcome::InvalidScheme)
        );
        assert_eq!(
            validate(&urls(&["example.com"])),
            Err(SubmissionOutcome::InvalidScheme)
        );
    }

    #[test]
    fn a_single_http_url_passes() {
        let list = urls(&["https://example.com/file.pdf"]);
        assert_eq!(validate(&list), Ok(&list[0]));
    }
}
