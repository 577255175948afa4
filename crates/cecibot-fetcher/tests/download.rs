//! Direct-download behaviour against a local stub origin.

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use cecibot_fetcher::download::fetch_file;
use cecibot_fetcher::FetchError;

const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;

/// Serves the stub origin on an ephemeral port and returns its base URL.
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

fn stub_origin() -> Router {
    Router::new()
        .route(
            "/file.pdf",
            get(|| async {
                ([(header::CONTENT_TYPE, "application/pdf")], vec![0u8; 1000])
            }),
        )
        .route(
            "/huge.zip",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "application/zip")],
                    vec![0u8; 5 * 1024 * 1024],
                )
            }),
        )
        .route(
            "/missing.pdf",
            get(|| async { StatusCode::NOT_FOUND.into_response() }),
        )
        .route(
            "/unsized.bin",
            get(|| async {
                let stream = futures_stream();
                axum::body::Body::from_stream(stream).into_response()
            }),
        )
}

/// A chunked body: no Content-Length on the wire.
fn futures_stream(
) -> impl futures::Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
    futures::stream::iter(vec![Ok(vec![1u8; 16]), Ok(vec![2u8; 16])])
}

#[tokio::test]
async fn small_file_is_downloaded_with_metadata() {
    let base = serve(stub_origin()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let client = reqwest::Client::new();

    let file = fetch_file(
        &client,
        &format!("{base}/file.pdf"),
        dir.path(),
        MAX_FILE_SIZE,
    )
    .await
    .expect("download should succeed");

    assert_eq!(file.title, "file.pdf");
    assert_eq!(file.extension, ".pdf");
    assert_eq!(file.mime, "application/pdf");
    assert_eq!(file.size, 1000);
    assert!(file.path.starts_with(dir.path()));
    assert_eq!(
        std::fs::metadata(&file.path).expect("artefact should exist").len(),
        1000
    );
}

#[tokio::test]
async fn oversize_declared_length_fails_without_a_file() {
    let base = serve(stub_origin()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let client = reqwest::Client::new();

    let err = fetch_file(
        &client,
        &format!("{base}/huge.zip"),
        dir.path(),
        MAX_FILE_SIZE,
    )
    .await
    .expect_err("oversize download should fail");

    assert!(matches!(err, FetchError::TooBig { size, .. } if size == 5 * 1024 * 1024));
    assert!(
        err.to_string().starts_with("file is too big:"),
        "wire message should start with the size-cap prefix, got: {err}"
    );
    assert_eq!(
        std::fs::read_dir(dir.path()).expect("read dir").count(),
        0,
        "no file may be written"
    );
}

#[tokio::test]
async fn non_200_status_is_reported() {
    let base = serve(stub_origin()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let client = reqwest::Client::new();

    let err = fetch_file(
        &client,
        &format!("{base}/missing.pdf"),
        dir.path(),
        MAX_FILE_SIZE,
    )
    .await
    .expect_err("404 should fail");

    assert!(matches!(err, FetchError::BadStatus(404)));
    assert_eq!(err.to_string(), "not 200 OK: 404");
}

#[tokio::test]
async fn missing_content_length_is_reported() {
    let base = serve(stub_origin()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let client = reqwest::Client::new();

    let err = fetch_file(
        &client,
        &format!("{base}/unsized.bin"),
        dir.path(),
        MAX_FILE_SIZE,
    )
    .await
    .expect_err("missing content-length should fail");

    assert!(matches!(err, FetchError::SizeUnknown));
    assert_eq!(err.to_string(), "file size unknown");
    assert_eq!(
        std::fs::read_dir(dir.path()).expect("read dir").count(),
        0,
        "no file may be written"
    );
}
