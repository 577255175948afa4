//! Queue bus between frontends and the render worker.
//!
//! A thin adapter over Redis lists. All frontends push request envelopes to
//! the tail of one shared `requests` list; the worker pops from its head.
//! Each medium gets its own `<medium>_responses` list for the way back.
//! FIFO ordering within a list is Redis's guarantee (RPUSH/BLPOP).
//!
//! Blocking pops are implemented as a loop of short-timeout `BLPOP` calls
//! with a `watch`-channel stop flag checked between slices, so a process can
//! shut down gracefully instead of hanging inside an indefinite pop.

use cecibot_types::{Request, Response};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

/// The single request list shared by every frontend.
pub const REQUESTS_LIST: &str = "requests";

/// How long each BLPOP slice blocks before the stop flag is re-checked.
const POP_SLICE_SECONDS: f64 = 1.0;

/// Name of the response list for a medium.
pub fn response_list(medium: &str) -> String {
    format!("{medium}_responses")
}

/// Errors that can occur on the bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The underlying Redis operation failed.
    #[error("redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// An envelope could not be serialised before pushing.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// A popped payload was not a valid envelope.
    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Handle to the queue bus. Cheap to clone; all clones share one multiplexed
/// connection.
#[derive(Clone)]
pub struct Bus {
    conn: ConnectionManager,
}

impl Bus {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connects to Redis at `url` and wraps the connection in a bus handle.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Redis` if the URL is invalid or the initial
    /// connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self::new(conn))
    }

    /// Appends a request envelope to the tail of the shared `requests` list.
    pub async fn push_request(&self, request: &Request) -> Result<(), BusError> {
        self.push(REQUESTS_LIST, request).await
    }

    /// Pops the next request from the head of `requests`, blocking until one
    /// arrives or `stop` flips to `true` (then returns `Ok(None)`).
    pub async fn pop_request(
        &self,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Option<Request>, BusError> {
        self.pop(REQUESTS_LIST, stop).await
    }

    /// Appends a response envelope to the tail of `<medium>_responses`.
    pub async fn push_response(&self, medium: &str, response: &Response) -> Result<(), BusError> {
        self.push(&response_list(medium), response).await
    }

    /// Pops the next response for `medium`, blocking until one arrives or
    /// `stop` flips to `true` (then returns `Ok(None)`).
    pub async fn pop_response(
        &self,
        medium: &str,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Option<Response>, BusError> {
        self.pop(&response_list(medium), stop).await
    }

    async fn push<T: Serialize>(&self, list: &str, envelope: &T) -> Result<(), BusError> {
        let payload = serde_json::to_string(envelope).map_err(BusError::Encode)?;
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(list, payload).await?;
        Ok(())
    }

    async fn pop<T: DeserializeOwned>(
        &self,
        list: &str,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Option<T>, BusError> {
        loop {
            if *stop.borrow() {
                return Ok(None);
            }

            let mut conn = self.conn.clone();
            // BLPOP returns (list, payload), or nil when the slice expires.
            let popped: Option<(String, String)> = conn.blpop(list, POP_SLICE_SECONDS).await?;

            if let Some((_, payload)) = popped {
                return serde_json::from_str(&payload)
                    .map(Some)
                    .map_err(BusError::Decode);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_list_names_are_per_medium() {
        assert_eq!(response_list("telegram"), "telegram_responses");
        assert_eq!(response_list("email"), "email_responses");
    }
}
