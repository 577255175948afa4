//! cecibot-telegram binary — the Telegram frontend.
//!
//! Runs the ingress updater and the egress delivery loop side by side. A
//! queue/KV failure in ingress is fatal (exit 1, supervisor restarts);
//! everything else is logged and retried.

mod api;
mod config;
mod updater;

use api::BotApi;
use cecibot_audit::RequestLogger;
use cecibot_bus::Bus;
use cecibot_frontend::{run_egress, Ingress};
use cecibot_ratelimit::RateLimiter;
use config::Config;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use updater::TelegramDeliver;

const MEDIUM: &str = "telegram";

#[tokio::main]
async fn main() {
    let config = config::load_config(Some("telegram.toml"))
        .expect("failed to load configuration — the frontend cannot start without valid config");

    init_tracing(&config);

    let token = std::env::var("CECIBOT_TELEGRAM_SECRET")
        .expect("CECIBOT_TELEGRAM_SECRET must be set — the bot token is env-only");

    let client = redis::Client::open(config.redis.url.clone())
        .expect("invalid redis url — check redis.url in config");
    let conn = client
        .get_connection_manager()
        .await
        .expect("failed to connect to redis");

    let bus = Bus::new(conn.clone());
    let limiter = RateLimiter::new(
        conn,
        MEDIUM,
        config.telegram.cool_down_seconds,
        config.telegram.max_attempts,
    );

    let audit_dir = match config.audit.base_dir.as_str() {
        "" => RequestLogger::default_base_dir(MEDIUM),
        dir => dir.into(),
    };
    let audit = Arc::new(Mutex::new(RequestLogger::new(
        audit_dir,
        config.audit.flush_threshold,
    )));

    let ingress = Ingress::new(bus.clone(), limiter, Arc::clone(&audit), MEDIUM);

    let http = reqwest::Client::builder()
        .user_agent("cecibot/0.1")
        .build()
        .expect("failed to build http client");
    let api = BotApi::new(http, config.telegram.api_base.clone(), token);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    let deliverer = TelegramDeliver::new(api.clone());
    let mut ingress_stop = stop_rx.clone();
    let egress_handle = tokio::spawn({
        let bus = bus.clone();
        let mut egress_stop = stop_rx;
        async move { run_egress(&bus, MEDIUM, &deliverer, &mut egress_stop).await }
    });

    let ingress_result = updater::run_updater(
        &api,
        &ingress,
        config.telegram.poll_timeout_seconds,
        &mut ingress_stop,
    )
    .await;

    if let Err(e) = ingress_result {
        tracing::error!(error = %e, "ingress failed fatally");
        flush_audit(&audit);
        std::process::exit(1);
    }

    match egress_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "egress failed"),
        Err(e) => tracing::error!(error = %e, "egress task panicked"),
    }

    flush_audit(&audit);
    tracing::info!("cecibot-telegram shut down");
}

fn flush_audit(audit: &Arc<Mutex<RequestLogger>>) {
    let mut logger = audit.lock().unwrap_or_else(|e| e.into_inner());
    if let Err(e) = logger.flush() {
        tracing::error!(error = %e, "failed to flush audit log");
    }
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
