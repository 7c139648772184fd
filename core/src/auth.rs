//! Family PIN hashing and the per-IP login lockout.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

pub const PIN_LENGTH: usize = 6;
pub const MAX_FAILED_ATTEMPTS: u32 = 5;
pub const LOCKOUT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Lowercase hex SHA-256 of the PIN.
#[must_use]
pub fn hash_pin(pin: &str) -> String {
    Sha256::digest(pin.as_bytes())
        .iter()
        .fold(String::with_capacity(64), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

/// Compares the PIN against the configured reference hash. Without a
/// reference every PIN is rejected.
#[must_use]
pub fn verify_pin(pin: &str, reference: Option<&str>) -> bool {
    let Some(reference) = reference.map(str::trim).filter(|r| !r.is_empty()) else {
        tracing::error!("no family PIN hash configured; rejecting login");
        return false;
    };
    hash_pin(pin).eq_ignore_ascii_case(reference)
}

#[must_use]
pub fn is_valid_pin_format(pin: &str) -> bool {
    pin.chars().count() == PIN_LENGTH
}

#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    count: u32,
    last_failure: Instant,
}

/// Fixed-window lockout keyed by client IP. Lives for the whole process and
/// is shared through the router state.
#[derive(Debug)]
pub struct LoginRateLimiter {
    attempts: Mutex<HashMap<String, FailureRecord>>,
    max_attempts: u32,
    window: Duration,
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new(MAX_FAILED_ATTEMPTS, LOCKOUT_WINDOW)
    }
}

impl LoginRateLimiter {
    #[must_use]
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            max_attempts,
            window,
        }
    }

    pub fn is_limited(&self, ip: &str) -> bool {
        self.is_limited_at(ip, Instant::now())
    }

    /// Expired records are evicted on lookup.
    pub fn is_limited_at(&self, ip: &str, now: Instant) -> bool {
        let mut attempts = self.lock();
        let Some(record) = attempts.get(ip).copied() else {
            return false;
        };
        if now.saturating_duration_since(record.last_failure) > self.window {
            attempts.remove(ip);
            return false;
        }
        record.count >= self.max_attempts
    }

    pub fn record_failure(&self, ip: &str) {
        self.record_failure_at(ip, Instant::now());
    }

    pub fn record_failure_at(&self, ip: &str, now: Instant) {
        let mut attempts = self.lock();
        attempts
            .entry(ip.to_string())
            .and_modify(|r| {
                r.count += 1;
                r.last_failure = now;
            })
            .or_insert(FailureRecord {
                count: 1,
                last_failure: now,
            });
    }

    pub fn clear(&self, ip: &str) {
        self.lock().remove(ip);
    }

    #[must_use]
    pub fn failure_count(&self, ip: &str) -> u32 {
        self.lock().get(ip).map_or(0, |r| r.count)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, FailureRecord>> {
        self.attempts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_pin_is_stable_sha256() {
        assert_eq!(
            hash_pin("123456"),
            "8d969eef6ecad3c29a3a629280e686cf0c3f5d5a86aff3ca12020c923adc6c92"
        );
        assert_eq!(hash_pin("123456"), hash_pin("123456"));
        assert_ne!(hash_pin("123456"), hash_pin("654321"));
    }

    #[test]
    fn test_verify_pin() {
        let reference = hash_pin("246810");
        assert!(verify_pin("246810", Some(&reference)));
        assert!(verify_pin("246810", Some(&reference.to_uppercase())));
        assert!(!verify_pin("000000", Some(&reference)));
    }

    #[test]
    fn test_verify_pin_without_reference_rejects() {
        assert!(!verify_pin("246810", None));
        assert!(!verify_pin("246810", Some("  ")));
    }

    #[test]
    fn test_pin_format() {
        assert!(is_valid_pin_format("123456"));
        assert!(!is_valid_pin_format("12345"));
        assert!(!is_valid_pin_format("1234567"));
        assert!(!is_valid_pin_format(""));
    }

    #[test]
    fn test_sixth_attempt_blocked_after_five_failures() {
        let limiter = LoginRateLimiter::default();
        let start = Instant::now();
        for i in 0..5 {
            assert!(!limiter.is_limited_at("10.0.0.1", start));
            limiter.record_failure_at("10.0.0.1", start + Duration::from_secs(i));
        }
        assert!(limiter.is_limited_at("10.0.0.1", start + Duration::from_secs(10)));
        assert!(!limiter.is_limited_at("10.0.0.2", start));
    }

    #[test]
    fn test_success_clears_counter() {
        let limiter = LoginRateLimiter::default();
        for _ in 0..4 {
            limiter.record_failure("10.0.0.1");
        }
        assert_eq!(limiter.failure_count("10.0.0.1"), 4);
        limiter.clear("10.0.0.1");
        assert_eq!(limiter.failure_count("10.0.0.1"), 0);
        limiter.record_failure("10.0.0.1");
        assert!(!limiter.is_limited("10.0.0.1"));
    }

    #[test]
    fn test_lockout_expires_after_window() {
        let limiter = LoginRateLimiter::default();
        let start = Instant::now();
        for _ in 0..5 {
            limiter.record_failure_at("10.0.0.1", start);
        }
        assert!(limiter.is_limited_at("10.0.0.1", start + LOCKOUT_WINDOW));
        assert!(!limiter.is_limited_at(
            "10.0.0.1",
            start + LOCKOUT_WINDOW + Duration::from_secs(1)
        ));
        // the stale record was evicted, so counting starts over
        assert_eq!(limiter.failure_count("10.0.0.1"), 0);
    }

    #[test]
    fn test_failure_refreshes_window() {
        let limiter = LoginRateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        limiter.record_failure_at("ip", start);
        limiter.record_failure_at("ip", start + Duration::from_secs(50));
        assert!(limiter.is_limited_at("ip", start + Duration::from_secs(100)));
    }
}
