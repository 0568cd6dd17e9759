//! Connection retry with exponential backoff.
//!
//! The TCP transport dials every `connect` endpoint through
//! [`retry_with_backoff`]. A peer that is still starting up refuses the
//! connection; backing off gives it time to bind its listener, so sessions
//! can be launched in any order.
//!
//! Only [`Error::TransportRetryable`] is retried. Every other error, and the
//! last retryable one once [`RetryConfig::max_attempts`] is exhausted, is
//! returned as is.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::RandomState;
use std::future::Future;
use std::hash::BuildHasher;
use std::time::Duration;

use crate::Error;

/// Backoff settings for establishing links.
///
/// Serialized with durations in milliseconds:
///
/// ```
/// use mom_pubsub::RetryConfig;
///
/// let retry: RetryConfig = serde_json::from_str(
///     r#"{"max_attempts": 5, "multiplier": 2.0, "initial_delay_ms": 50, "max_delay_ms": 1000}"#,
/// ).unwrap();
/// assert_eq!(retry.max_attempts, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = dial once).
    pub max_attempts: u32,

    /// Growth factor applied to the delay after each retry.
    pub multiplier: f32,

    /// Delay before the first retry.
    #[serde(rename = "initial_delay_ms", with = "millis")]
    pub initial_delay: Duration,

    /// Upper bound for any single delay.
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    /// Three retries starting at 100ms, doubling, capped at 5s.
    fn default() -> Self {
        // ---
        Self {
            max_attempts: 3,
            multiplier: 2.0,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Check that the delays this config produces are well defined.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if `multiplier` is not a finite number of
    /// at least 1.0.
    pub fn validate(&self) -> crate::Result<()> {
        // ---
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "retry multiplier must be finite and >= 1.0, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }

    /// The un-jittered delays slept between attempts, in order.
    pub fn delays(&self) -> Backoff {
        Backoff {
            next: self.initial_delay.min(self.max_delay),
            remaining: self.max_attempts,
            multiplier: f64::from(self.multiplier),
            max_delay: self.max_delay,
        }
    }
}

/// Iterator over backoff delays, see [`RetryConfig::delays`].
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    remaining: u32,
    multiplier: f64,
    max_delay: Duration,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let current = self.next;
        self.next = Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .map_or(self.max_delay, |next| next.min(self.max_delay));
        Some(current)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the delays of `retry` run out.
///
/// Each delay from [`RetryConfig::delays`] is jittered by ±25% before
/// sleeping, so sessions started together do not dial in lockstep.
pub(crate) async fn retry_with_backoff<F, Fut, T>(retry: &RetryConfig, mut operation: F) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    // ---
    let mut delays = retry.delays();
    let mut attempt = 1u32;

    loop {
        let details = match operation().await {
            Err(Error::TransportRetryable(details)) => details,
            done => return done,
        };

        let Some(delay) = delays.next() else {
            crate::log_debug!("giving up after {attempt} attempt(s): {details}");
            return Err(Error::TransportRetryable(details));
        };

        let delay = apply_jitter(delay);
        crate::log_debug!(
            "attempt {attempt}/{} failed ({details}), retrying in {delay:?}",
            retry.max_attempts + 1
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Scale `delay` by a random factor in `0.75..1.25`.
fn apply_jitter(delay: Duration) -> Duration {
    // ---
    let hash = RandomState::new().hash_one(std::time::SystemTime::now());
    let factor = 0.75 + (hash % 1000) as f64 / 2000.0;

    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(delay)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            multiplier: 2.0,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        }
    }

    fn refused() -> Error {
        Error::TransportRetryable("connection refused".into())
    }

    #[test]
    fn test_delays_grow_and_cap() {
        // ---
        let retry = RetryConfig {
            max_attempts: 5,
            multiplier: 3.0,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        };
        let delays: Vec<u128> = retry.delays().map(|d| d.as_millis()).collect();
        assert_eq!(delays, vec![10, 30, 90, 100, 100]);

        assert_eq!(fast_retry(0).delays().count(), 0);
    }

    #[test]
    fn test_bad_multiplier_rejected_without_panic() {
        // ---
        let retry: RetryConfig = serde_json::from_str(r#"{"multiplier": -2.0}"#).unwrap();
        assert!(matches!(retry.validate(), Err(Error::InvalidConfig(_))));

        // Out-of-range growth falls back to the cap
        let delays: Vec<Duration> = retry.delays().take(3).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_secs(5));

        for multiplier in [f32::NAN, f32::INFINITY, 0.5] {
            let retry = RetryConfig {
                multiplier,
                ..RetryConfig::default()
            };
            assert!(retry.validate().is_err(), "accepted {multiplier}");
            assert_eq!(retry.delays().count(), 3);
        }

        let huge = RetryConfig {
            max_attempts: 4,
            multiplier: f32::MAX,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::MAX,
        };
        assert!(huge.validate().is_ok());
        assert_eq!(huge.delays().last(), Some(Duration::MAX));

        assert!(RetryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_jitter_bounds() {
        // ---
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let d = apply_jitter(base);
            assert!(d >= Duration::from_millis(750) && d < Duration::from_millis(1250));
        }
    }

    #[tokio::test]
    async fn test_succeeds_once_listener_is_up() {
        // ---
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&fast_retry(3), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(refused())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        // ---
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&fast_retry(2), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(refused()) }
        })
        .await;

        assert!(matches!(result, Err(Error::TransportRetryable(_))));
        // First dial + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_bad_endpoint_is_not_retried() {
        // ---
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&RetryConfig::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Error::InvalidLocator("udp/nowhere".into())) }
        })
        .await;

        assert!(matches!(result, Err(Error::InvalidLocator(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waits_between_attempts() {
        // ---
        let retry = RetryConfig {
            max_attempts: 3,
            multiplier: 2.0,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(500),
        };
        let start = Instant::now();

        let _ = retry_with_backoff(&retry, || async { Err::<(), _>(refused()) }).await;

        // 50 + 100 + 200 ms, each at least 0.75x after jitter
        assert!(start.elapsed() >= Duration::from_millis(262));
    }

    #[test]
    fn test_serde_defaults_missing_fields() {
        // ---
        let retry: RetryConfig = serde_json::from_str(r#"{"max_attempts": 7}"#).unwrap();
        assert_eq!(retry.max_attempts, 7);
        assert_eq!(retry.initial_delay, Duration::from_millis(100));

        let json = serde_json::to_value(&retry).unwrap();
        assert_eq!(json["max_delay_ms"], 5000);
    }
}
