//! Per-client rate limiting for the `/api/` routes
//!
//! Sliding window of request instants per client IP.

use dashmap::DashMap;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;

/// Sliding-window rate limiter keyed by client IP
#[derive(Debug)]
pub struct RateLimiter {
    /// Request instants per client in the current window
    requests: DashMap<IpAddr, Vec<Instant>>,
    /// Window size
    window: Duration,
    /// Max requests per window (0 = unlimited)
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            requests: DashMap::new(),
            window,
            max_requests,
        }
    }

    /// Limiter with a one-minute window
    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(Duration::from_secs(60), max_requests)
    }

    /// Whether the limiter is active at all
    pub fn is_enabled(&self) -> bool {
        self.max_requests > 0
    }

    /// Check if a request is allowed and record it
    pub fn check_and_record(&self, client: IpAddr) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let now = Instant::now();
        let mut entry = self.requests.entry(client).or_default();

        entry.retain(|&ts| now.duration_since(ts) < self.window);

        if entry.len() >= self.max_requests as usize {
            return false;
        }

        entry.push(now);
        true
    }

    /// Drop clients with no requests left in the window
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.requests.retain(|_, requests| {
            requests.retain(|&ts| now.duration_since(ts) < self.window);
            !requests.is_empty()
        });
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.requests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_per_client() {
        let limiter = RateLimiter::per_minute(2);
        let a = ip("10.0.0.1");
        let b = ip("10.0.0.2");

        assert!(limiter.check_and_record(a));
        assert!(limiter.check_and_record(a));
        assert!(!limiter.check_and_record(a));

        // Other clients have their own budget
        assert!(limiter.check_and_record(b));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::per_minute(1);
        let a = ip("10.0.0.1");

        assert!(limiter.check_and_record(a));
        assert!(!limiter.check_and_record(a));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check_and_record(a));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_drops_idle_clients() {
        let limiter = RateLimiter::per_minute(5);
        limiter.check_and_record(ip("10.0.0.1"));
        limiter.check_and_record(ip("10.0.0.2"));
        assert_eq!(limiter.tracked_clients(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        limiter.cleanup();
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_zero_disables() {
        let limiter = RateLimiter::per_minute(0);
        assert!(!limiter.is_enabled());
        for _ in 0..100 {
            assert!(limiter.check_and_record(ip("10.0.0.1")));
        }
        assert_eq!(limiter.tracked_clients(), 0);
    }
}
