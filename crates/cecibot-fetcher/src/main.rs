//! cecibot-fetcher binary — the backend render worker.
//!
//! Connects to Redis, launches the shared headless browser, and runs the
//! render loop until SIGINT/SIGTERM. The in-flight request finishes before
//! the browser is closed.

use cecibot_bus::Bus;
use cecibot_fetcher::config::{self, Config};
use cecibot_fetcher::{BrowserSession, RenderOptions, Worker};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = config::load_config(Some("fetcher.toml"))
        .expect("failed to load configuration — the worker cannot start without valid config");

    init_tracing(&config);

    let bus = Bus::connect(&config.redis.url)
        .await
        .expect("failed to connect to redis — check redis.url in config");

    let executable = match config.fetcher.chrome_executable.as_str() {
        "" => None,
        path => Some(path),
    };
    let session = BrowserSession::launch(executable)
        .await
        .expect("failed to launch the headless browser — is chromium installed?");

    let http = reqwest::Client::builder()
        .user_agent("cecibot/0.1")
        .build()
        .expect("failed to build http client");

    let worker = Worker::new(
        bus,
        session,
        http,
        PathBuf::from(&config.fetcher.download_path),
        config.fetcher.max_file_size,
        RenderOptions {
            navigation_timeout: Duration::from_millis(config.fetcher.navigation_timeout_ms),
            page_width_px: config.fetcher.page_width_px,
        },
    );

    let (stop_tx, mut stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    worker.run(&mut stop_rx).await;

    worker.shutdown().await;
    tracing::info!("cecibot-fetcher shut down");
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
