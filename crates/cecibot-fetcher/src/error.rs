//! Per-request failure taxonomy.
//!
//! The `Display` of a [`FetchError`] *is* the wire error message: the worker
//! puts `error.to_string()` straight into the response envelope, so every
//! variant's format string is part of the user-facing contract. Unexpected
//! causes collapse to the single message `internal error` while keeping
//! their source chain for the worker's log.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Navigation did not finish inside the deadline.
    #[error("timeout")]
    Timeout,

    /// DNS, TLS, connection or HTTP-level failure during navigation.
    #[error("navigation: {0}")]
    Navigation(String),

    /// Direct download answered with a non-200 status.
    #[error("not 200 OK: {0}")]
    BadStatus(u16),

    /// Direct download carried no `Content-Length` header.
    #[error("file size unknown")]
    SizeUnknown,

    /// Size cap breached, before or after transfer.
    #[error("file is too big: {size} bytes (> {max} bytes of maximum allowed)")]
    TooBig { size: u64, max: u64 },

    /// Unexpected HTTP client failure.
    #[error("internal error")]
    Http(#[source] reqwest::Error),

    /// Unexpected browser/driver failure.
    #[error("internal error")]
    Browser(#[source] chromiumoxide::error::CdpError),

    /// Unexpected filesystem failure.
    #[error("internal error")]
    Io(#[source] std::io::Error),
}

impl FetchError {
    /// True for the catch-all variants that deserve a full error-level log
    /// entry with their source chain; the expected failures log at info.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            FetchError::Http(_) | FetchError::Browser(_) | FetchError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_messages_are_stable() {
        assert_eq!(FetchError::Timeout.to_string(), "timeout");
        assert_eq!(
            FetchError::Navigation("net::ERR_NAME_NOT_RESOLVED".to_string()).to_string(),
            "navigation: net::ERR_NAME_NOT_RESOLVED"
        );
        assert_eq!(FetchError::BadStatus(404).to_string(), "not 200 OK: 404");
        assert_eq!(FetchError::SizeUnknown.to_string(), "file size unknown");
        assert_eq!(
            FetchError::TooBig {
                size: 5_242_880,
                max: 2_097_152
            }
            .to_string(),
            "file is too big: 5242880 bytes (> 2097152 bytes of maximum allowed)"
        );
    }

    #[test]
    fn unexpected_failures_read_as_internal_error() {
        let err = FetchError::Io(std::io::Error::other("disk on fire"));
        assert_eq!(err.to_string(), "internal error");
        assert!(err.is_internal());
        assert!(!FetchError::Timeout.is_internal());
    }
}
