//! Per-session sliding window rate limiter

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Maximum accepted lines inside one window
pub const MESSAGE_RATE_LIMIT: usize = 5;

/// Length of the trailing window
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(5);

/// Sliding window over the timestamps of recently accepted lines
///
/// Only accepted lines are recorded, so a client hammering the server
/// while limited does not extend its own penalty.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    accepted: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            accepted: VecDeque::with_capacity(limit),
        }
    }

    /// Record a line at `now`, or return how long to wait until the
    /// oldest recorded line leaves the window.
    pub fn check(&mut self, now: Instant) -> Result<(), Duration> {
        while let Some(&oldest) = self.accepted.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.accepted.pop_front();
            } else {
                break;
            }
        }

        if self.accepted.len() >= self.limit {
            let oldest = self.accepted.front().copied().unwrap_or(now);
            let wait = (oldest + self.window).saturating_duration_since(now);
            return Err(wait);
        }

        self.accepted.push_back(now);
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(MESSAGE_RATE_LIMIT, RATE_LIMIT_WINDOW)
    }
}
