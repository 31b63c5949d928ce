//! In-memory failed-auth limiter, bucketed by caller IP.
//!
//! Process-local by design: fine for a single-instance deployment, and
//! documented as the scale boundary. Entries are pruned opportunistically on
//! every touch.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use cawt_core::constants::{FAILED_AUTH_MAX_PER_WINDOW, FAILED_AUTH_WINDOW_SECS};
use cawt_core::types::Timestamp;

#[derive(Default)]
pub struct FailedAuthLimiter {
    failures: Mutex<HashMap<IpAddr, Vec<Timestamp>>>,
}

impl FailedAuthLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when this IP has exhausted its failure budget for the window.
    pub fn is_limited(&self, ip: IpAddr, now: Timestamp) -> bool {
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        match failures.get_mut(&ip) {
            Some(times) => {
                times.retain(|t| now - *t < FAILED_AUTH_WINDOW_SECS);
                times.len() as u32 >= FAILED_AUTH_MAX_PER_WINDOW
            }
            None => false,
        }
    }

    /// Record one authentication failure.
    pub fn record_failure(&self, ip: IpAddr, now: Timestamp) {
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let times = failures.entry(ip).or_default();
        times.retain(|t| now - *t < FAILED_AUTH_WINDOW_SECS);
        times.push(now);
    }

    /// Drop empty and fully-expired buckets.
    pub fn prune(&self, now: Timestamp) {
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        failures.retain(|_, times| {
            times.retain(|t| now - *t < FAILED_AUTH_WINDOW_SECS);
            !times.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([203, 0, 113, last])
    }

    #[test]
    fn limits_after_budget_exhausted() {
        let limiter = FailedAuthLimiter::new();
        for _ in 0..FAILED_AUTH_MAX_PER_WINDOW {
            assert!(!limiter.is_limited(ip(1), 100));
            limiter.record_failure(ip(1), 100);
        }
        assert!(limiter.is_limited(ip(1), 100));
        assert!(!limiter.is_limited(ip(2), 100), "per-IP buckets");
    }

    #[test]
    fn window_expiry_restores_budget() {
        let limiter = FailedAuthLimiter::new();
        for _ in 0..FAILED_AUTH_MAX_PER_WINDOW {
            limiter.record_failure(ip(1), 100);
        }
        assert!(limiter.is_limited(ip(1), 100));
        assert!(!limiter.is_limited(ip(1), 100 + FAILED_AUTH_WINDOW_SECS + 1));
    }

    #[test]
    fn prune_discards_stale_buckets() {
        let limiter = FailedAuthLimiter::new();
        limiter.record_failure(ip(1), 100);
        limiter.prune(100 + FAILED_AUTH_WINDOW_SECS + 1);
        assert!(limiter.failures.lock().unwrap().is_empty());
    }
}
