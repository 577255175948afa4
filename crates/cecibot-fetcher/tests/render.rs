//! Render-path tests. These drive a real headless Chromium and are ignored
//! by default; run them with `cargo test -- --ignored` on a machine with a
//! chromium binary on the PATH (or CECIBOT_CHROME_EXECUTABLE set).

use axum::response::Html;
use axum::routing::get;
use axum::Router;
use cecibot_fetcher::render::{render_page, RenderOptions};
use cecibot_fetcher::{BrowserSession, FetchError};
use std::time::Duration;

const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;

fn options() -> RenderOptions {
    RenderOptions {
        navigation_timeout: Duration::from_millis(5_000),
        page_width_px: 1080,
    }
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub origin");
    let addr = listener.local_addr().expect("stub origin addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub origin");
    });
    format!("http://{addr}")
}

async fn launch() -> BrowserSession {
    let executable = std::env::var("CECIBOT_CHROME_EXECUTABLE").ok();
    BrowserSession::launch(executable.as_deref())
        .await
        .expect("launch browser")
}

#[tokio::test]
#[ignore = "requires a chromium binary"]
async fn minimal_page_renders_to_pdf() {
    let app = Router::new().route(
        "/",
        get(|| async { Html("<html><head><title>Hi</title></head><body>hello</body></html>") }),
    );
    let base = serve(app).await;
    let dir = tempfile::tempdir().expect("tempdir");

    let session = launch().await;
    let file = render_page(
        &session.browser,
        &options(),
        &format!("{base}/"),
        dir.path(),
        MAX_FILE_SIZE,
    )
    .await
    .expect("render should succeed");

    assert_eq!(file.title, "Hi");
    assert_eq!(file.extension, ".pdf");
    assert_eq!(file.mime, "application/pdf");
    assert!(file.size > 0 && file.size <= MAX_FILE_SIZE);
    let magic = std::fs::read(&file.path).expect("artefact should exist");
    assert_eq!(&magic[..5], b"%PDF-");

    session.close().await;
}

#[tokio::test]
#[ignore = "requires a chromium binary"]
async fn stalled_navigation_times_out() {
    let app = Router::new().route(
        "/",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Html("too late")
        }),
    );
    let base = serve(app).await;
    let dir = tempfile::tempdir().expect("tempdir");

    let session = launch().await;
    let err = render_page(
        &session.browser,
        &options(),
        &format!("{base}/"),
        dir.path(),
        MAX_FILE_SIZE,
    )
    .await
    .expect_err("stalled page should time out");

    assert!(matches!(err, FetchError::Timeout));
    assert_eq!(err.to_string(), "timeout");

    session.close().await;
}

#[tokio::test]
#[ignore = "requires a chromium binary"]
async fn unresolvable_host_is_a_navigation_error() {
    let dir = tempfile::tempdir().expect("tempdir");

    let session = launch().await;
    let err = render_page(
        &session.browser,
        &options(),
        "https://does-not-resolve.invalid/",
        dir.path(),
        MAX_FILE_SIZE,
    )
    .await
    .expect_err("bogus host should fail navigation");

    assert!(matches!(err, FetchError::Navigation(_)));
    assert!(err.to_string().starts_with("navigation: "));

    session.close().await;
}
