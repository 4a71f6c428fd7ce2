// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Per-session token bucket.
//!
//! Every outbound upstream call pays one token. An empty bucket blocks the
//! session's command queue until the refill allows the next call, which is
//! how the configured rate mode throttles all workload classes at once.

use std::time::Duration;
use tokio::time::Instant;

/// Bucket parameters per configured mode.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitMode {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl RateLimitMode {
    pub fn from_name(name: &str) -> Self {
        match name {
            "aggressive" => RateLimitMode {
                capacity: 30.0,
                refill_per_sec: 3.0,
            },
            "conservative" => RateLimitMode {
                capacity: 10.0,
                refill_per_sec: 0.4,
            },
            // balanced is also the fallback for unknown names
            _ => RateLimitMode {
                capacity: 20.0,
                refill_per_sec: 1.0,
            },
        }
    }
}

/// Token bucket owned by a single session actor.
#[derive(Debug)]
pub struct RateBudget {
    mode: RateLimitMode,
    tokens: f64,
    last_refill: Instant,
}

impl RateBudget {
    pub fn new(mode: RateLimitMode) -> Self {
        Self {
            mode,
            tokens: mode.capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.mode.refill_per_sec).min(self.mode.capacity);
        self.last_refill = now;
    }

    /// Take one token, returning how long the caller must wait first.
    /// Separated from the sleep for testability.
    pub fn take(&mut self, now: Instant) -> Option<Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let missing = 1.0 - self.tokens;
            let wait = missing / self.mode.refill_per_sec;
            // The token is consumed on behalf of the waited call.
            self.tokens = 0.0;
            self.last_refill = now + Duration::from_secs_f64(wait);
            Some(Duration::from_secs_f64(wait))
        }
    }

    /// Pay for one upstream call, sleeping while the budget is exhausted.
    pub async fn acquire(&mut self) {
        if let Some(wait) = self.take(Instant::now()) {
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bucket_blocks_once_drained() {
        let mode = RateLimitMode {
            capacity: 2.0,
            refill_per_sec: 1.0,
        };
        let mut budget = RateBudget::new(mode);
        let now = Instant::now();

        assert!(budget.take(now).is_none());
        assert!(budget.take(now).is_none());

        // Third call within the same instant must wait one refill period.
        let wait = budget.take(now).expect("bucket should be empty");
        assert!((wait.as_secs_f64() - 1.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn bucket_refills_over_time() {
        let mode = RateLimitMode {
            capacity: 5.0,
            refill_per_sec: 2.0,
        };
        let mut budget = RateBudget::new(mode);
        let start = Instant::now();
        for _ in 0..5 {
            assert!(budget.take(start).is_none());
        }
        // Two seconds later four tokens are back.
        let later = start + Duration::from_secs(2);
        for _ in 0..4 {
            assert!(budget.take(later).is_none());
        }
        assert!(budget.take(later).is_some());
    }

    #[test]
    fn unknown_mode_falls_back_to_balanced() {
        let mode = RateLimitMode::from_name("warp-speed");
        assert!((mode.capacity - 20.0).abs() < f64::EPSILON);
    }
}
