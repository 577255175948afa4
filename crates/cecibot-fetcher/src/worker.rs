//! The render loop: pop a request, produce a response, always answer.

use crate::browser::BrowserSession;
use crate::classify::is_file;
use crate::download::fetch_file;
use crate::render::{render_page, RenderOptions};
use cecibot_bus::Bus;
use cecibot_types::{Request, Response};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

/// How long to back off after a bus failure before polling again.
const BUS_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Everything one request needs; owned by the loop, shared with nothing.
pub struct Worker {
    bus: Bus,
    session: BrowserSession,
    http: reqwest::Client,
    download_path: PathBuf,
    max_file_size: u64,
    render_options: RenderOptions,
}

impl Worker {
    pub fn new(
        bus: Bus,
        session: BrowserSession,
        http: reqwest::Client,
        download_path: PathBuf,
        max_file_size: u64,
        render_options: RenderOptions,
    ) -> Self {
        Self {
            bus,
            session,
            http,
            download_path,
            max_file_size,
            render_options,
        }
    }

    /// Closes the shared browser. Call after [`run`](Self::run) returns.
    pub async fn shutdown(self) {
        self.session.close().await;
    }

    /// Processes requests until `stop` flips to `true`.
    ///
    /// Requests are handled one at a time: navigation and PDF synthesis are
    /// sequential on the shared browser anyway, and a single in-flight
    /// request keeps resource use bounded. Head-of-line blocking is the
    /// accepted price.
    ///
    /// The loop survives everything: per-request failures become error
    /// responses, bus failures are retried after a short delay.
    pub async fn run(&self, stop: &mut watch::Receiver<bool>) {
        tracing::info!("render worker ready for requests");

        loop {
            let request = match self.bus.pop_request(stop).await {
                Ok(Some(request)) => request,
                Ok(None) => {
                    tracing::info!("render worker stopping");
                    return;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to pop request, retrying");
                    tokio::time::sleep(BUS_RETRY_DELAY).await;
                    continue;
                }
            };

            let response = self.handle(&request).await;

            if let Err(e) = self.bus.push_response(&request.medium, &response).await {
                tracing::error!(
                    medium = %request.medium,
                    url = %request.url,
                    error = %e,
                    "failed to push response, dropping it"
                );
            }
        }
    }

    /// Produces the response for one request. Infallible by construction:
    /// every failure maps to an error envelope.
    async fn handle(&self, request: &Request) -> Response {
        tracing::info!(url = %request.url, medium = %request.medium, "processing request");

        let result = if is_file(&request.url) {
            fetch_file(
                &self.http,
                &request.url,
                &self.download_path,
                self.max_file_size,
            )
            .await
        } else {
            render_page(
                &self.session.browser,
                &self.render_options,
                &request.url,
                &self.download_path,
                self.max_file_size,
            )
            .await
        };

        match result {
            Ok(file) => {
                tracing::info!(
                    url = %request.url,
                    path = %file.path.display(),
                    size = file.size,
                    "produced artefact"
                );
                Response::file(request, file)
            }
            Err(error) => {
                if error.is_internal() {
                    // Keep the full source chain; the wire only says
                    // "internal error".
                    tracing::error!(url = %request.url, error = ?error, "request failed unexpectedly");
                } else {
                    tracing::info!(url = %request.url, error = %error, "request failed");
                }
                Response::error(request, error.to_string())
            }
        }
    }
}
