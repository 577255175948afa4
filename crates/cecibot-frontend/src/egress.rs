//! The egress loop: pop responses, deliver, clean up.

use cecibot_bus::{Bus, BusError};
use cecibot_types::{FileInfo, Response, ResponseBody};
use std::future::Future;
use tokio::sync::watch;

/// Prefix applied to every user-visible error relayed by a frontend.
pub const ERROR_PREFIX: &str = "cecibot error: ";

/// Platform-specific delivery of one response.
///
/// Implementations address the user through the envelope's `opaque` payload
/// (chat/message IDs, reply-to headers) that the same frontend put there on
/// the way in.
pub trait Deliver {
    type Error: std::fmt::Display;

    /// Sends the artefact back to the user.
    fn deliver_file(
        &self,
        response: &Response,
        file: &FileInfo,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Sends an error message (already prefixed) back to the user.
    fn deliver_error(
        &self,
        response: &Response,
        message: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Consumes `<medium>_responses` until `stop` flips, dispatching each
/// response through `deliverer`.
///
/// Artefacts are unlinked after the delivery attempt, successful or not:
/// responses are transient by contract and a frontend that keeps failing to
/// deliver must not fill the disk.
///
/// # Errors
///
/// Returns `BusError` when the queue itself fails; delivery failures are
/// logged per response and do not stop the loop.
pub async fn run_egress<D: Deliver>(
    bus: &Bus,
    medium: &str,
    deliverer: &D,
    stop: &mut watch::Receiver<bool>,
) -> Result<(), BusError> {
    loop {
        let Some(response) = bus.pop_response(medium, stop).await? else {
            tracing::info!(medium, "egress stopping");
            return Ok(());
        };

        match &response.body {
            ResponseBody::File { file } => {
                tracing::info!(url = %response.url, path = %file.path.display(), "delivering file");
                if let Err(e) = deliverer.deliver_file(&response, file).await {
                    tracing::error!(url = %response.url, error = %e, "file delivery failed");
                }
                if let Err(e) = tokio::fs::remove_file(&file.path).await {
                    tracing::warn!(path = %file.path.display(), error = %e, "failed to unlink artefact");
                }
            }
            ResponseBody::Error { error } => {
                let message = format!("{ERROR_PREFIX}{}", error.message);
                tracing::info!(url = %response.url, message = %error.message, "delivering error");
                if let Err(e) = deliverer.deliver_error(&response, &message).await {
                    tracing::error!(url = %response.url, error = %e, "error delivery failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_prefix_matches_the_user_contract() {
        assert_eq!(format!("{ERROR_PREFIX}timeout"), "cecibot error: timeout");
    }
}
