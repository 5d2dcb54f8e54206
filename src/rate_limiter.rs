//! Minimum-spacing pacer for outbound provider calls.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::config::ConfigError;

/// Paces callers so that consecutive calls are at least
/// `interval / requests_per_interval` apart.
///
/// Each caller reserves the next free slot under a short lock and then sleeps
/// on the tokio timer, so concurrent callers are queued without holding a
/// worker thread. Tests drive it with tokio's paused clock.
#[derive(Debug)]
pub struct RateLimiter {
    spacing: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_interval: u32, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if requests_per_interval == 0 {
            return Err(ConfigError::ZeroRequestBudget);
        }

        Ok(Self {
            spacing: interval / requests_per_interval,
            next_slot: Mutex::new(None),
        })
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    pub async fn wait(&self) {
        let slot = {
            let mut next = self
                .next_slot
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + self.spacing);
            slot
        };

        let now = Instant::now();
        if slot > now {
            debug!(
                component = "rate_limiter",
                event = "rate_limiter.wait",
                wait_ms = (slot - now).as_millis() as u64
            );
            sleep_until(slot).await;
        }
    }
}
