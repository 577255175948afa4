//! The shared headless-browser session.
//!
//! One Chromium lives for the whole worker process: launching costs seconds
//! and hundreds of megabytes, while a fresh page per request costs almost
//! nothing. Page isolation is enough here because script execution is
//! disabled on every page the worker opens.

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use futures::StreamExt;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Errors from launching or tearing down the browser.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The launch configuration was rejected.
    #[error("invalid browser configuration: {0}")]
    Config(String),

    /// Chromium failed to start or speak CDP.
    #[error("failed to launch browser: {0}")]
    Launch(#[from] CdpError),
}

/// A running browser plus the task driving its CDP event loop.
pub struct BrowserSession {
    pub browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Launches a headless Chromium and spawns its event-loop task.
    ///
    /// # Errors
    ///
    /// Returns `BrowserError` when the binary cannot be found or started.
    pub async fn launch(executable: Option<&str>) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder();
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::Config)?;

        let (browser, mut handler) = Browser::launch(config).await?;

        // The handler stream must be polled for the browser to make any
        // progress; it ends when the browser process goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            tracing::debug!("browser event loop ended");
        });

        Ok(Self {
            browser,
            handler_task,
        })
    }

    /// Closes the browser and stops the event-loop task.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::warn!(error = %e, "failed to close browser cleanly");
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!(error = %e, "browser process wait failed");
        }
        self.handler_task.abort();
    }
}
