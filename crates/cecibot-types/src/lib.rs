//! Shared wire types for the cecibot platform.
//!
//! This crate defines the request/response envelopes that travel over the
//! queue bus, plus the [`Identity`] fragment used by the rate limiter. Every
//! other crate in the workspace depends on `cecibot-types` and nothing else
//! internal, which keeps the dependency graph flat.
//!
//! The envelopes are JSON on the wire. Decoding is strict where it matters:
//! the response body is a closed tagged sum (`kind` is `file` or `error`,
//! nothing else), so a malformed or unknown message fails at the decode
//! boundary instead of deep inside a frontend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A request envelope, produced by a frontend and consumed by the render
/// worker (and mirrored into the audit log).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// The URL to fetch. Must begin with `http://` or `https://`.
    pub url: String,

    /// Tag of the originating frontend (`telegram`, `email`, ...). Selects
    /// the response list the worker pushes to.
    pub medium: String,

    /// Frontend-chosen correlation payload, echoed verbatim in the response.
    pub opaque: serde_json::Value,

    /// Schema version of `identifier`.
    pub identifier_version: u32,

    /// Identifies sender + message within the medium. Audit only; the worker
    /// never looks at it.
    pub identifier: serde_json::Value,
}

/// A response envelope, produced by the render worker and consumed by the
/// frontend that originated the matching request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Echoed from the request.
    pub url: String,

    /// Echoed from the request, byte-for-byte after the JSON round-trip.
    pub opaque: serde_json::Value,

    #[serde(flatten)]
    pub body: ResponseBody,
}

/// The two possible outcomes of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseBody {
    /// The URL was rendered or downloaded into a local file.
    File { file: FileInfo },
    /// The request failed; `message` is user-presentable.
    Error { error: ErrorInfo },
}

/// Metadata of a produced artefact.
///
/// `path` is local to the machine the worker ran on; deployments co-locate
/// the worker and the frontends (or mount the download directory).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Display name: the page `<title>` for renders, the URL basename for
    /// direct downloads.
    pub title: String,
    /// On-disk location of the artefact.
    pub path: PathBuf,
    /// File extension including the leading dot (`.pdf`), or empty.
    pub extension: String,
    /// MIME type reported by the origin server, or `application/pdf` for
    /// rendered pages.
    pub mime: String,
    /// Size in bytes, as measured on disk.
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
}

impl Response {
    /// Builds a `file` response, echoing `opaque` and `url` from the request.
    pub fn file(request: &Request, file: FileInfo) -> Self {
        Self {
            url: request.url.clone(),
            opaque: request.opaque.clone(),
            body: ResponseBody::File { file },
        }
    }

    /// Builds an `error` response, echoing `opaque` and `url` from the
    /// request.
    pub fn error(request: &Request, message: impl Into<String>) -> Self {
        Self {
            url: request.url.clone(),
            opaque: request.opaque.clone(),
            body: ResponseBody::Error {
                error: ErrorInfo {
                    message: message.into(),
                },
            },
        }
    }
}

/// Returns `true` if the URL carries one of the two supported schemes.
///
/// Frontends reject anything else before it reaches the queue, so the worker
/// can assume `http://` or `https://`.
pub fn has_supported_scheme(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// The normalised string a rate-limit counter is keyed by.
///
/// The fragment formats are fixed (operators grep for them in Redis):
///
/// - Telegram: `(<user-id>)`
/// - Email, whitelisted provider: `complete.(<reversed-domain>).(<local>)`
/// - Email, unknown domain: `nolocal.(<reversed-domain>)`
///
/// The full counter key is assembled by the rate limiter as
/// `<medium>.rate_limiting.counter.<fragment>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(fragment: impl Into<String>) -> Self {
        Self(fragment.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
