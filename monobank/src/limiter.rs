//! Per-endpoint call throttling for the banking API.
//!
//! The provider allows roughly one call per endpoint per minute for each
//! credential. Every bank client owns one [`RateLimiter`] per logical
//! operation so a burst on one endpoint never starves another.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::trace;

use crate::error::Endpoint;

/// Single-token bucket: one call is allowed per `interval`.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    /// When the token was last taken.
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Takes the token if it is available. Never blocks.
    pub fn allow(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock();
        match *last {
            Some(at) if now.duration_since(at) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Instant at which the next call would be allowed.
    pub fn ready_at(&self) -> Instant {
        match *self.last.lock() {
            Some(at) => at + self.interval,
            None => Instant::now(),
        }
    }

    /// Sleeps until the token is available, then takes it.
    pub async fn until_ready(&self) {
        loop {
            if self.allow() {
                return;
            }
            let ready_at = self.ready_at();
            trace!(wait = ?ready_at.saturating_duration_since(Instant::now()), "waiting for rate limiter");
            tokio::time::sleep_until(ready_at).await;
        }
    }
}

/// Intervals for each endpoint bucket, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub info_secs: u64,
    pub statement_secs: u64,
    pub webhook_secs: u64,
    pub currency_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            info_secs: 65,
            statement_secs: 65,
            webhook_secs: 60,
            currency_secs: 60,
        }
    }
}

/// The independent buckets owned by one bank client.
#[derive(Debug)]
pub struct Limits {
    info: RateLimiter,
    statement: RateLimiter,
    webhook: RateLimiter,
    currency: RateLimiter,
}

impl Limits {
    pub fn new(config: &LimitsConfig) -> Self {
        Self {
            info: RateLimiter::new(Duration::from_secs(config.info_secs)),
            statement: RateLimiter::new(Duration::from_secs(config.statement_secs)),
            webhook: RateLimiter::new(Duration::from_secs(config.webhook_secs)),
            currency: RateLimiter::new(Duration::from_secs(config.currency_secs)),
        }
    }

    pub fn bucket(&self, endpoint: Endpoint) -> &RateLimiter {
        match endpoint {
            Endpoint::Info => &self.info,
            Endpoint::Statement => &self.statement,
            Endpoint::Webhook => &self.webhook,
            Endpoint::Currency => &self.currency,
        }
    }
}
