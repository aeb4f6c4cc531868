//! Exponential backoff with jitter and provider-honored `Retry-After`
//! (component C12). Shared by the Caption Provider (§4.5) and the Gateway
//! Submission Client HTTP layer (§4.10), each supplying their own bounds.

use std::time::Duration;

use rand::Rng;

#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    /// Defaults per §4.5: `max_retries=5`, `base=500ms`, `max=20s`, `jitter=0.2`.
    fn default() -> Self {
        Self {
            max_retries: 5,
            base: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
            jitter: 0.2,
        }
    }
}

impl BackoffPolicy {
    /// Linear policy used by the Gateway HTTP layer (§4.10): up to 3
    /// attempts, `0.5 * attempt` seconds, no jitter.
    pub fn linear_gateway() -> Self {
        Self {
            max_retries: 2, // 3 total attempts
            base: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.0,
        }
    }

    /// Delay before the `attempt`'th retry (1-indexed), honoring a
    /// `retry_after` hint from the server when present.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.max_delay);
        }
        if self.jitter == 0.0 {
            // Linear policy: 0.5s * attempt, uncapped by exponent.
            return (self.base * attempt).min(self.max_delay);
        }
        let exp_ms = (self.base.as_millis() as f64) * 2f64.powi(attempt as i32 - 1);
        let capped_ms = exp_ms.min(self.max_delay.as_millis() as f64);
        let fuzz = rand::rng().random_range(-self.jitter..=self.jitter);
        let fuzzed_ms = (capped_ms * (1.0 + fuzz)).max(0.0);
        Duration::from_millis(fuzzed_ms as u64)
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Classifies whether an error/status is worth retrying at all.
pub trait RetryClassifier {
    fn is_retryable(&self) -> bool;
    /// A server-supplied `Retry-After`, if any, in whole seconds.
    fn retry_after_secs(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_hint_is_capped_by_max_delay() {
        let policy = BackoffPolicy::default();
        let delay = policy.delay_for(1, Some(Duration::from_secs(3600)));
        assert_eq!(delay, policy.max_delay);
    }

    #[test]
    fn exponential_growth_is_bounded() {
        let policy = BackoffPolicy {
            jitter: 0.0,
            ..BackoffPolicy::default()
        };
        let first = policy.delay_for(1, None);
        let second = policy.delay_for(2, None);
        assert_eq!(first, Duration::from_millis(500));
        assert_eq!(second, Duration::from_millis(1000));
    }

    #[test]
    fn linear_gateway_policy_allows_three_attempts() {
        let policy = BackoffPolicy::linear_gateway();
        assert_eq!(policy.total_attempts(), 3);
        assert_eq!(policy.delay_for(2, None), Duration::from_secs(1));
    }

    #[test]
    fn retry_bound_matches_max_retries_plus_one() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.total_attempts(), 6);
    }
}
