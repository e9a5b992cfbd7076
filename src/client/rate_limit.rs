use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Fixed-window throttle settings: after every `batch_size` requests, pause `delay_ms`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RateLimitConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            delay_ms: default_delay_ms(),
        }
    }
}

fn default_batch_size() -> usize {
    1
}

fn default_delay_ms() -> u64 {
    100
}

/// Per-client request throttle.
///
/// The call counter lives inside the limiter, so two clients never share a
/// window. The lock is held across the pause, which serializes callers that
/// arrive while a window is closing.
#[derive(Debug)]
pub struct RateLimiter {
    batch_size: usize,
    delay: Duration,
    count: Mutex<usize>,
}

impl RateLimiter {
    pub fn new(batch_size: usize, delay: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            delay,
            count: Mutex::new(0),
        }
    }

    pub async fn throttle(&self) {
        let mut count = self.count.lock().await;
        *count += 1;
        if *count >= self.batch_size {
            debug!("Rate limit window reached, pausing {:?}", self.delay);
            tokio::time::sleep(self.delay).await;
            *count = 0;
        }
    }
}

impl From<&RateLimitConfig> for RateLimiter {
    fn from(config: &RateLimitConfig) -> Self {
        Self::new(config.batch_size, Duration::from_millis(config.delay_ms))
    }
}
