//! State-machine tests against a live Redis.
//!
//! Run with a local Redis and `cargo test -- --ignored`. Each test uses a
//! unique identity so runs do not interfere; keys are deleted up front in
//! case an earlier run was interrupted.

use cecibot_ratelimit::{RateLimitStatus, RateLimiter};
use cecibot_types::Identity;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const COOL_DOWN_SECONDS: u64 = 30;
const MAX_ATTEMPTS: u32 = 10;

async fn connect() -> ConnectionManager {
    let url =
        std::env::var("CECIBOT_TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
    let client = redis::Client::open(url).expect("redis url");
    client.get_connection_manager().await.expect("connect")
}

async fn fresh_limiter(identity: &Identity) -> (RateLimiter, ConnectionManager) {
    let conn = connect().await;
    let limiter = RateLimiter::new(conn.clone(), "rl-test", COOL_DOWN_SECONDS, MAX_ATTEMPTS);
    let mut cleanup = conn.clone();
    cleanup
        .del::<_, ()>(limiter.counter_key(identity))
        .await
        .expect("cleanup");
    (limiter, conn)
}

#[tokio::test]
#[ignore = "requires a running redis"]
async fn eleven_attempts_walk_the_full_ladder() {
    let identity = Identity::new("(full-ladder)");
    let (limiter, conn) = fresh_limiter(&identity).await;

    // 1st: free, opens the window.
    assert_eq!(
        limiter.check(&identity).await.expect("check"),
        RateLimitStatus::Free
    );

    // 2nd: first hit inside the window — notify once.
    assert_eq!(
        limiter.check(&identity).await.expect("check"),
        RateLimitStatus::RateLimitedNow
    );

    // 3rd..10th: silent drops.
    for _ in 3..=10 {
        assert_eq!(
            limiter.check(&identity).await.expect("check"),
            RateLimitStatus::RateLimitedAgain
        );
    }

    // 11th: counter reaches MAX_ATTEMPTS — blacklisted.
    assert_eq!(
        limiter.check(&identity).await.expect("check"),
        RateLimitStatus::Blacklisted
    );

    // The key must now persist without a TTL.
    let mut conn = conn.clone();
    let ttl: i64 = conn
        .ttl(limiter.counter_key(&identity))
        .await
        .expect("ttl");
    assert_eq!(ttl, -1, "blacklisted key should have no expiry");

    limiter.clear(&identity).await.expect("cleanup");
}

#[tokio::test]
#[ignore = "requires a running redis"]
async fn blacklisting_is_sticky_until_cleared() {
    let identity = Identity::new("(sticky)");
    let (limiter, _conn) = fresh_limiter(&identity).await;

    limiter.check(&identity).await.expect("check");
    for _ in 0..MAX_ATTEMPTS {
        limiter.check(&identity).await.expect("check");
    }

    for _ in 0..5 {
        assert_eq!(
            limiter.check(&identity).await.expect("check"),
            RateLimitStatus::Blacklisted
        );
    }

    // Operator intervention is the only way back.
    limiter.clear(&identity).await.expect("clear");
    assert_eq!(
        limiter.check(&identity).await.expect("check"),
        RateLimitStatus::Free
    );

    limiter.clear(&identity).await.expect("cleanup");
}
