//! Round-trip tests against a live Redis.
//!
//! Run with a local Redis and `cargo test -- --ignored`. The address can be
//! overridden with `CECIBOT_TEST_REDIS_URL`.

use cecibot_bus::Bus;
use cecibot_types::{FileInfo, Request, Response, ResponseBody};
use serde_json::json;
use tokio::sync::watch;

fn redis_url() -> String {
    std::env::var("CECIBOT_TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string())
}

fn request(marker: &str) -> Request {
    Request {
        url: format!("https://example.com/{marker}"),
        medium: "bus-test".to_string(),
        opaque: json!({"marker": marker, "nested": {"n": 1}}),
        identifier_version: 1,
        identifier: json!({"marker": marker}),
    }
}

#[tokio::test]
#[ignore = "requires a running redis"]
async fn request_round_trip_preserves_envelope() {
    let bus = Bus::connect(&redis_url()).await.expect("connect");
    let (_stop_tx, mut stop_rx) = watch::channel(false);

    let sent = request("round-trip");
    bus.push_request(&sent).await.expect("push");

    let got = bus
        .pop_request(&mut stop_rx)
        .await
        .expect("pop")
        .expect("an envelope should be waiting");
    assert_eq!(got, sent);
}

#[tokio::test]
#[ignore = "requires a running redis"]
async fn responses_are_fifo_per_medium() {
    let bus = Bus::connect(&redis_url()).await.expect("connect");
    let (_stop_tx, mut stop_rx) = watch::channel(false);

    let req = request("fifo");
    let first = Response::error(&req, "timeout");
    let second = Response::file(
        &req,
        FileInfo {
            title: "fifo".to_string(),
            path: "/tmp/fifo.pdf".into(),
            extension: ".pdf".to_string(),
            mime: "application/pdf".to_string(),
            size: 12,
        },
    );

    bus.push_response("bus-test", &first).await.expect("push");
    bus.push_response("bus-test", &second).await.expect("push");

    let got_first = bus
        .pop_response("bus-test", &mut stop_rx)
        .await
        .expect("pop")
        .expect("first response");
    let got_second = bus
        .pop_response("bus-test", &mut stop_rx)
        .await
        .expect("pop")
        .expect("second response");

    assert!(matches!(got_first.body, ResponseBody::Error { .. }));
    assert!(matches!(got_second.body, ResponseBody::File { .. }));
}

#[tokio::test]
#[ignore = "requires a running redis"]
async fn stopped_pop_returns_none() {
    let bus = Bus::connect(&redis_url()).await.expect("connect");
    let (stop_tx, mut stop_rx) = watch::channel(false);
    stop_tx.send(true).expect("send stop");

    let got = bus
        .pop_response("bus-test-empty", &mut stop_rx)
        .await
        .expect("pop");
    assert!(got.is_none());
}
