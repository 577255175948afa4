//! Medium-agnostic frontend adapter logic.
//!
//! Each frontend binary pairs two tasks: **ingress** (platform message in,
//! request envelope out) and **egress** (response envelope in, artefact or
//! error message out). The platform-specific edges (how a Telegram update
//! or an inbound email turns into text, and how a reply is sent) stay in
//! the binaries; everything the two frontends must agree on lives here:
//!
//! - the validation ladder (exactly one URL, supported scheme),
//! - the rate-limit policy (notify once, then silence),
//! - envelope construction and the audit tap,
//! - response dispatch and artefact cleanup.

mod egress;
mod ingress;

pub use egress::{run_egress, Deliver, ERROR_PREFIX};
pub use ingress::{Ingress, IngressError, SubmissionOutcome};

/// Extracts `http(s)://` URLs from free text by whitespace tokenisation.
///
/// Used by frontends whose platform does not annotate URLs (email subjects).
/// Telegram instead trusts the platform's `url` message entities.
pub fn extract_urls(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter(|token| token.starts_with("http://") || token.starts_with("https://"))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_urls_from_surrounding_text() {
        assert_eq!(
            extract_urls("please fetch https://example.com/a for me"),
            vec!["https://example.com/a"]
        );
        assert_eq!(
            extract_urls("http://one.example/ https://two.example/"),
            vec!["http://one.example/", "https://two.example/"]
        );
    }

    #[test]
    fn ignores_text_without_urls() {
        assert!(extract_urls("no links here").is_empty());
        assert!(extract_urls("ftp://example.com/file").is_empty());
        assert!(extract_urls("").is_empty());
    }
}
