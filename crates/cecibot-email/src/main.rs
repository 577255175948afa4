//! cecibot-email binary — the email frontend.
//!
//! Ingress is an axum server receiving raw inbound mail from the provider's
//! webhook; egress is the shared delivery loop sending replies over SMTP.

mod address;
mod app;
mod config;
mod mail;
mod outbox;

use app::AppState;
use cecibot_audit::RequestLogger;
use cecibot_bus::Bus;
use cecibot_frontend::{run_egress, Ingress};
use cecibot_ratelimit::RateLimiter;
use config::Config;
use outbox::{EmailDeliver, Mailer};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const MEDIUM: &str = "email";

#[tokio::main]
async fn main() {
    let config = config::load_config(Some("email.toml"))
        .expect("failed to load configuration — the frontend cannot start without valid config");

    init_tracing(&config);

    let webhook_key = std::env::var("CECIBOT_EMAIL_WEBHOOK_KEY")
        .expect("CECIBOT_EMAIL_WEBHOOK_KEY must be set — the webhook key is env-only");
    let smtp_password = std::env::var("CECIBOT_SMTP_PASSWORD").unwrap_or_default();

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
        config.email.cool_down_seconds,
        config.email.max_attempts,
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

    let mailer = Mailer::new(
        &config.email.smtp_host,
        config.email.smtp_port,
        &config.email.smtp_username,
        &smtp_password,
        &config.email.from_address,
    )
    .expect("failed to build smtp mailer — check the [email] section in config");

    let (shutdown, stop_rx) = app::Shutdown::new();

    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.request();
        });
    }

    let state = Arc::new(AppState {
        ingress,
        mailer: mailer.clone(),
        webhook_key,
        shutdown: Arc::clone(&shutdown),
    });

    let deliverer = EmailDeliver::new(mailer);
    let egress_handle = tokio::spawn({
        let bus = bus.clone();
        let mut egress_stop = stop_rx.clone();
        async move { run_egress(&bus, MEDIUM, &deliverer, &mut egress_stop).await }
    });

    let addr = SocketAddr::new(config.server.host, config.server.port);
    tracing::info!(%addr, "starting cecibot email frontend");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    let mut server_stop = stop_rx.clone();
    axum::serve(listener, app::app(Arc::clone(&state)))
        .with_graceful_shutdown(async move {
            let _ = server_stop.wait_for(|stopped| *stopped).await;
        })
        .await
        .expect("server error");

    match egress_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "egress failed"),
        Err(e) => tracing::error!(error = %e, "egress task panicked"),
    }

    flush_audit(&audit);

    // The stop flag flips for SIGINT/SIGTERM and for fatal ingress errors;
    // only the latter must surface as a non-zero exit.
    if shutdown.is_fatal() {
        std::process::exit(1);
    }

    tracing::info!("cecibot-email shut down");
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
