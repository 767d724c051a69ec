use std::time::{Duration, Instant};

use dashmap::DashMap;

const MAX_FAILURES: u32 = 5;
const WINDOW: Duration = Duration::from_secs(15 * 60);

/// Per-email sign-in brute force limiter: 5 failures per 15 minutes.
pub struct LoginRateLimiter {
    /// email -> (failed_count, window_start)
    entries: DashMap<String, (u32, Instant)>,
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Reserve an attempt. Every reserved attempt counts as a failure until
    /// `reset` (success) or `release` (not a password failure) settles it.
    /// On rejection returns the seconds left in the window.
    pub fn try_acquire(&self, email: &str) -> Result<(), u64> {
        self.try_acquire_at(email, Instant::now())
    }

    fn try_acquire_at(&self, email: &str, now: Instant) -> Result<(), u64> {
        let mut entry = self.entries.entry(email.to_lowercase()).or_insert((0, now));
        let (count, start) = entry.value_mut();
        let elapsed = now.saturating_duration_since(*start);

        if elapsed > WINDOW {
            *count = 0;
            *start = now;
        } else if *count >= MAX_FAILURES {
            return Err(WINDOW.as_secs().saturating_sub(elapsed.as_secs()));
        }

        *count += 1;
        Ok(())
    }

    /// Give back a reserved attempt that did not fail on the password.
    pub fn release(&self, email: &str) {
        if let Some(mut entry) = self.entries.get_mut(&email.to_lowercase()) {
            let (count, _) = entry.value_mut();
            *count = count.saturating_sub(1);
        }
    }

    pub fn reset(&self, email: &str) {
        self.entries.remove(&email.to_lowercase());
    }

    /// Drop windows that have already elapsed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, (_, start)| now.duration_since(*start) <= WINDOW);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
