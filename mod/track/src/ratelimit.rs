//! Per-actor sliding-window throttling of mutating operations.
//!
//! State is process-local and resets on restart — a deliberate
//! trade-off (no external dependency) that a multi-instance deployment
//! would replace with an external keyed counter store behind the same
//! check/record interface. Policies are pure configuration values
//! passed in, never hard-coded at call sites.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Throttling policy for one action class.
#[derive(Debug, Clone)]
pub struct RatePolicy {
    /// Action-class prefix, e.g. "create-task". Distinct prefixes are
    /// independent counters per actor.
    pub prefix: String,
    /// Maximum attempts within the window.
    pub max_attempts: u32,
    /// Rolling window length in milliseconds.
    pub window_ms: u64,
}

impl RatePolicy {
    pub fn new(prefix: impl Into<String>, max_attempts: u32, window_ms: u64) -> Self {
        Self {
            prefix: prefix.into(),
            max_attempts,
            window_ms,
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Seconds until the oldest surviving attempt falls out of the
    /// window (0 when no attempts are recorded).
    pub reset_in_secs: u64,
}

/// Sliding-window attempt counter keyed by (actor, action prefix).
///
/// Entries are created lazily on first check and pruned lazily on
/// read; there is no background garbage collection — the process
/// lifetime is the container lifetime.
#[derive(Default)]
pub struct RateLimiter {
    // (actor_id, prefix) -> monotonically appended attempt timestamps
    // in epoch milliseconds. The head of the vec is always the oldest.
    attempts: Mutex<HashMap<(String, String), Vec<u64>>>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `actor_id` may perform another action under
    /// `policy`. Does not consume quota.
    pub fn check(&self, actor_id: &str, policy: &RatePolicy) -> RateDecision {
        self.check_at(actor_id, policy, now_ms())
    }

    /// Record one attempt. Call only after the gated operation is
    /// known to be otherwise valid, so that rejected requests
    /// (validation, not-found, forbidden) never consume quota.
    pub fn record(&self, actor_id: &str, prefix: &str) {
        self.record_at(actor_id, prefix, now_ms());
    }

    /// `check` with an explicit clock, for tests.
    pub fn check_at(&self, actor_id: &str, policy: &RatePolicy, now_ms: u64) -> RateDecision {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let entry = attempts
            .entry((actor_id.to_string(), policy.prefix.clone()))
            .or_default();

        // Prune: keep only attempts still inside the rolling window.
        entry.retain(|&t| t + policy.window_ms > now_ms);

        let allowed = (entry.len() as u32) < policy.max_attempts;
        let reset_in_secs = match entry.first() {
            Some(&oldest) => (oldest + policy.window_ms)
                .saturating_sub(now_ms)
                .div_ceil(1000),
            None => 0,
        };

        RateDecision {
            allowed,
            reset_in_secs,
        }
    }

    /// `record` with an explicit clock, for tests.
    pub fn record_at(&self, actor_id: &str, prefix: &str, now_ms: u64) {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts
            .entry((actor_id.to_string(), prefix.to_string()))
            .or_default()
            .push(now_ms);
    }
}

/// The full policy table for the lifecycle engine, one policy per
/// mutating action class. Loaded from server configuration;
/// `Default` gives sane single-instance limits.
#[derive(Debug, Clone)]
pub struct RateLimits {
    pub create_project: RatePolicy,
    pub update_project: RatePolicy,
    pub create_task: RatePolicy,
    pub update_task: RatePolicy,
    pub delete_task: RatePolicy,
    pub create_sprint: RatePolicy,
    pub update_sprint: RatePolicy,
    pub complete_sprint: RatePolicy,
    pub delete_sprint: RatePolicy,
}

impl Default for RateLimits {
    fn default() -> Self {
        const MINUTE: u64 = 60_000;
        Self {
            create_project: RatePolicy::new("create-project", 10, MINUTE),
            update_project: RatePolicy::new("update-project", 30, MINUTE),
            create_task: RatePolicy::new("create-task", 30, MINUTE),
            update_task: RatePolicy::new("update-task", 60, MINUTE),
            delete_task: RatePolicy::new("delete-task", 30, MINUTE),
            create_sprint: RatePolicy::new("create-sprint", 10, MINUTE),
            update_sprint: RatePolicy::new("update-sprint", 30, MINUTE),
            complete_sprint: RatePolicy::new("complete-sprint", 10, MINUTE),
            delete_sprint: RatePolicy::new("delete-sprint", 10, MINUTE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max: u32, window_ms: u64) -> RatePolicy {
        RatePolicy::new("create-task", max, window_ms)
    }

    #[test]
    fn allows_until_quota_exhausted() {
        let limiter = RateLimiter::new();
        let p = policy(3, 10_000);
        let t0 = 1_000_000;

        for i in 0..3 {
            let d = limiter.check_at("u1", &p, t0 + i);
            assert!(d.allowed, "attempt {i} should be allowed");
            limiter.record_at("u1", &p.prefix, t0 + i);
        }

        let denied = limiter.check_at("u1", &p, t0 + 3);
        assert!(!denied.allowed);
        assert!(denied.reset_in_secs > 0);
    }

    #[test]
    fn window_expiry_re_allows() {
        let limiter = RateLimiter::new();
        let p = policy(2, 10_000);
        let t0 = 1_000_000;

        limiter.record_at("u1", &p.prefix, t0);
        limiter.record_at("u1", &p.prefix, t0 + 100);
        assert!(!limiter.check_at("u1", &p, t0 + 200).allowed);

        // Past the window from the oldest attempt: the oldest expires,
        // one slot frees up.
        let later = t0 + 10_001;
        let d = limiter.check_at("u1", &p, later);
        assert!(d.allowed);
    }

    #[test]
    fn reset_counts_down_to_oldest_expiry() {
        let limiter = RateLimiter::new();
        let p = policy(1, 10_000);
        let t0 = 1_000_000;

        limiter.record_at("u1", &p.prefix, t0);
        let d = limiter.check_at("u1", &p, t0 + 4_000);
        assert!(!d.allowed);
        assert_eq!(d.reset_in_secs, 6);
    }

    #[test]
    fn empty_state_has_zero_reset() {
        let limiter = RateLimiter::new();
        let d = limiter.check_at("u1", &policy(5, 10_000), 42);
        assert!(d.allowed);
        assert_eq!(d.reset_in_secs, 0);
    }

    #[test]
    fn prefixes_are_independent_counters() {
        let limiter = RateLimiter::new();
        let create = RatePolicy::new("create-task", 1, 10_000);
        let delete = RatePolicy::new("delete-sprint", 1, 10_000);
        let t0 = 1_000_000;

        limiter.record_at("u1", &create.prefix, t0);
        assert!(!limiter.check_at("u1", &create, t0 + 1).allowed);
        assert!(limiter.check_at("u1", &delete, t0 + 1).allowed);
    }

    #[test]
    fn actors_are_independent() {
        let limiter = RateLimiter::new();
        let p = policy(1, 10_000);
        let t0 = 1_000_000;

        limiter.record_at("u1", &p.prefix, t0);
        assert!(!limiter.check_at("u1", &p, t0 + 1).allowed);
        assert!(limiter.check_at("u2", &p, t0 + 1).allowed);
    }
}
