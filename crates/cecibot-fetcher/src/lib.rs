//! The cecibot render worker.
//!
//! Pulls request envelopes off the shared queue, turns each URL into a file
//! (a streamed direct download when the URL names a plain file, a headless
//! Chromium PDF render otherwise) and pushes the response back to the
//! originating medium's list. One request at a time, one long-lived browser,
//! and a hard safety envelope (timeouts, size caps, resource filtering)
//! around everything a remote page could abuse.

pub mod browser;
pub mod classify;
pub mod config;
pub mod download;
pub mod render;
pub mod worker;

mod error;

pub use browser::{BrowserError, BrowserSession};
pub use error::FetchError;
pub use render::RenderOptions;
pub use worker::Worker;
