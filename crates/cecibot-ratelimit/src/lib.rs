//! Per-identity rate limiting over Redis.
//!
//! Each identity owns one counter key,
//! `<medium>.rate_limiting.counter.<identity>`, whose TTL encodes the state:
//!
//! | TTL | State |
//! |-----|-------|
//! | -2 (absent) | FREE — the identity may submit now |
//! | >= 0 (expiring) | COOL-DOWN — value counts attempts inside the window |
//! | -1 (no expiry) | BLACKLISTED — persists until an operator deletes it |
//!
//! The whole check runs as a single server-side Lua script, so the TTL read
//! and the counter mutation are atomic in one round trip. Promotion to
//! BLACKLISTED rewrites the key without a TTL; there is no automatic way
//! back — see [`RateLimiter::clear`] for the operator tool.

use cecibot_types::Identity;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitStatus {
    /// Not in cool-down; the attempt was admitted and a fresh window opened.
    Free,
    /// First rejected attempt inside the window. The caller should tell the
    /// user to wait, exactly once.
    RateLimitedNow,
    /// A further rejected attempt inside the window. Stay silent.
    RateLimitedAgain,
    /// The identity exhausted its attempts (or was already blacklisted).
    /// Stay silent; only operator intervention clears this.
    Blacklisted,
}

impl RateLimitStatus {
    fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Free),
            1 => Some(Self::RateLimitedNow),
            2 => Some(Self::RateLimitedAgain),
            3 => Some(Self::Blacklisted),
            _ => None,
        }
    }
}

/// Errors that can occur during a check.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The underlying Redis operation failed.
    #[error("redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// The check script returned a code outside the protocol.
    #[error("rate-limit script returned unexpected code {0}")]
    UnexpectedCode(i64),
}

/// The counter key for an identity within a medium.
pub fn counter_key(medium: &str, identity: &Identity) -> String {
    format!("{medium}.rate_limiting.counter.{identity}")
}

/// The check, server-side. KEYS[1] is the counter key; ARGV[1] the cool-down
/// in seconds, ARGV[2] the blacklisting threshold. Returns the numeric
/// status code decoded by `RateLimitStatus::from_code`.
const CHECK_SCRIPT: &str = r#"
local ttl = redis.call('TTL', KEYS[1])
if ttl == -1 then
    return 3
end
if ttl == -2 then
    redis.call('SETEX', KEYS[1], tonumber(ARGV[1]), 0)
    return 0
end
local attempts = redis.call('INCR', KEYS[1])
if attempts >= tonumber(ARGV[2]) then
    redis.call('SET', KEYS[1], attempts)
    return 3
end
if attempts == 1 then
    return 1
end
return 2
"#;

/// Rate limiter for one medium.
#[derive(Clone)]
pub struct RateLimiter {
    conn: ConnectionManager,
    medium: String,
    cool_down_seconds: u64,
    max_attempts: u32,
}

impl RateLimiter {
    pub fn new(
        conn: ConnectionManager,
        medium: impl Into<String>,
        cool_down_seconds: u64,
        max_attempts: u32,
    ) -> Self {
        Self {
            conn,
            medium: medium.into(),
            cool_down_seconds,
            max_attempts,
        }
    }

    /// The cool-down window length, for user-facing "wait N seconds" notices.
    pub fn cool_down_seconds(&self) -> u64 {
        self.cool_down_seconds
    }

    /// The counter key for an identity.
    pub fn counter_key(&self, identity: &Identity) -> String {
        counter_key(&self.medium, identity)
    }

    /// Runs the state machine for one attempt by `identity`.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError::Redis` when the store is unreachable; callers
    /// in ingress treat that as fatal (the process exits and the supervisor
    /// restarts it).
    pub async fn check(&self, identity: &Identity) -> Result<RateLimitStatus, RateLimitError> {
        let key = self.counter_key(identity);
        let mut conn = self.conn.clone();

        let code: i64 = redis::Script::new(CHECK_SCRIPT)
            .key(&key)
            .arg(self.cool_down_seconds)
            .arg(self.max_attempts)
            .invoke_async(&mut conn)
            .await?;

        let status =
            RateLimitStatus::from_code(code).ok_or(RateLimitError::UnexpectedCode(code))?;
        if status == RateLimitStatus::Blacklisted {
            tracing::warn!(key = %key, "identity is blacklisted");
        }
        Ok(status)
    }

    /// Deletes an identity's counter, returning it to FREE. This is the
    /// operator's un-blacklisting tool; nothing in the bot calls it.
    pub async fn clear(&self, identity: &Identity) -> Result<(), RateLimitError> {
        let key = self.counter_key(identity);
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(&key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_the_protocol() {
        assert_eq!(RateLimitStatus::from_code(0), Some(RateLimitStatus::Free));
        assert_eq!(
            RateLimitStatus::from_code(1),
            Some(RateLimitStatus::RateLimitedNow)
        );
        assert_eq!(
            RateLimitStatus::from_code(2),
            Some(RateLimitStatus::RateLimitedAgain)
        );
        assert_eq!(
            RateLimitStatus::from_code(3),
            Some(RateLimitStatus::Blacklisted)
        );
        assert_eq!(RateLimitStatus::from_code(4), None);
        assert_eq!(RateLimitStatus::from_code(-1), None);
    }

    #[test]
    fn counter_keys_follow_the_namespace() {
        assert_eq!(
            counter_key("telegram", &Identity::new("(185810944)")),
            "telegram.rate_limiting.counter.(185810944)"
        );
        assert_eq!(
            counter_key("email", &Identity::new("complete.(com.gmail).(ab)")),
            "email.rate_limiting.counter.complete.(com.gmail).(ab)"
        );
        assert_eq!(
            counter_key("email", &Identity::new("nolocal.(com.mailinator)")),
            "email.rate_limiting.counter.nolocal.(com.mailinator)"
        );
    }

}
