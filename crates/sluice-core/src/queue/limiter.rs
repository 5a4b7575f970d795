//! Sliding-window rate limiter.

use tokio::time::{Duration, Instant};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Sliding-window admission control for one task category.
///
/// Tracks the instants of admitted requests over the last minute and the
/// last hour. `acquire` admits only when both windows have room, and only
/// then records the attempt in both. A capacity of 0 disables that window
/// entirely (always admits), an intentional escape hatch for categories
/// that only need quota control.
///
/// Timestamps come from `tokio::time::Instant`, so the paused test clock
/// drives the windows.
#[derive(Debug)]
pub struct RateLimiter {
    per_minute: u32,
    per_hour: u32,
    minute_window: Vec<Instant>,
    hour_window: Vec<Instant>,
}

impl RateLimiter {
    /// `per_hour` falls back to `per_minute * 60` when not configured.
    pub fn new(per_minute: u32, per_hour: Option<u32>) -> Self {
        Self {
            per_minute,
            per_hour: per_hour.unwrap_or(per_minute.saturating_mul(60)),
            minute_window: Vec::new(),
            hour_window: Vec::new(),
        }
    }

    /// Try to admit one request. Returns false without recording anything
    /// when either window is at capacity.
    pub fn acquire(&mut self) -> bool {
        let now = Instant::now();
        self.prune(now);

        if Self::full(&self.minute_window, self.per_minute)
            || Self::full(&self.hour_window, self.per_hour)
        {
            return false;
        }

        self.minute_window.push(now);
        self.hour_window.push(now);
        true
    }

    /// Time until the most-constrained window frees a slot (minute window
    /// checked first). Zero when a request would be admitted right now.
    pub fn wait_time(&mut self) -> Duration {
        let now = Instant::now();
        self.prune(now);

        // Entries are pushed in order, so the first one is the oldest.
        if Self::full(&self.minute_window, self.per_minute)
            && let Some(oldest) = self.minute_window.first()
        {
            return MINUTE.saturating_sub(now - *oldest);
        }
        if Self::full(&self.hour_window, self.per_hour)
            && let Some(oldest) = self.hour_window.first()
        {
            return HOUR.saturating_sub(now - *oldest);
        }
        Duration::ZERO
    }

    fn prune(&mut self, now: Instant) {
        self.minute_window.retain(|t| now - *t < MINUTE);
        self.hour_window.retain(|t| now - *t < HOUR);
    }

    fn full(window: &[Instant], capacity: u32) -> bool {
        capacity > 0 && window.len() >= capacity as usize
    }
}
