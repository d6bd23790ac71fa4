//! Fixed-window in-memory rate limiting.
//!
//! Buckets are keyed by caller-supplied strings (`scan:ip:…`,
//! `contact-clinic:email:…`) and replaced lazily when their window expires.
//! Process-local by design: this deployment runs a single instance and the
//! limiter is abuse damping, not a correctness mechanism.

use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_in: Duration,
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one hit against `key` and decide whether it fits the budget.
    pub fn check(&self, key: &str, window: Duration, max_requests: u32) -> RateDecision {
        let now = Instant::now();
        let mut entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket {
                count: 0,
                reset_at: now + window,
            });

        if entry.reset_at <= now {
            entry.count = 0;
            entry.reset_at = now + window;
        }

        if entry.count >= max_requests {
            return RateDecision {
                allowed: false,
                remaining: 0,
                reset_in: entry.reset_at.saturating_duration_since(now),
            };
        }

        entry.count += 1;
        RateDecision {
            allowed: true,
            remaining: max_requests.saturating_sub(entry.count),
            reset_in: entry.reset_at.saturating_duration_since(now),
        }
    }

    /// Drop expired buckets. Called opportunistically; correctness does not
    /// depend on it since stale buckets reset lazily on their next hit.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.buckets.retain(|_, bucket| bucket.reset_at > now);
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
