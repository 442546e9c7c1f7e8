//! Exponential backoff schedule for extraction retries
//!
//! [`BackoffPolicy`] is a pure description of the schedule: attempt `n`
//! (0-indexed retry) waits `initial_delay * multiplier^n`. [`RetryState`]
//! tracks one call's progress through that schedule and decides, per failure
//! kind, whether another attempt is allowed.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::ExtractionConfig;
use crate::error::ExtractionErrorKind;

/// Retry schedule for a single extraction call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Retries allowed after the first attempt (default: 3, i.e. 4 attempts)
    pub max_retries: u32,
    /// Delay before the first retry (default: 1s)
    pub initial_delay: Duration,
    /// Growth factor between consecutive delays (default: 2)
    pub multiplier: u32,
    /// Upper bound on time spent in attempts plus backoff sleeps
    pub max_elapsed: Option<Duration>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            multiplier: 2,
            max_elapsed: None,
        }
    }
}

impl BackoffPolicy {
    /// Build the policy from extraction configuration
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            multiplier: 2,
            max_elapsed: (config.max_elapsed_secs > 0)
                .then(|| Duration::from_secs(config.max_elapsed_secs)),
        }
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0 = first retry)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry);
        self.initial_delay.saturating_mul(factor)
    }

    /// Full delay schedule, one entry per allowed retry
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_retries).map(|n| self.delay_for(n)).collect()
    }
}

/// Why a retry loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The error kind is never retried
    NotRetryable,
    /// All retries were used
    Exhausted,
    /// The next sleep would cross `max_elapsed`
    BudgetExceeded,
}

/// Outcome of consulting the retry state after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Stop(StopReason),
}

/// Progress of one call through a [`BackoffPolicy`]
#[derive(Debug)]
pub struct RetryState<'a> {
    policy: &'a BackoffPolicy,
    retries_used: u32,
    started_at: Instant,
}

impl<'a> RetryState<'a> {
    pub fn start(policy: &'a BackoffPolicy) -> Self {
        Self {
            policy,
            retries_used: 0,
            started_at: Instant::now(),
        }
    }

    /// Index of the attempt currently in flight (0 = first attempt)
    pub fn attempt(&self) -> u32 {
        self.retries_used
    }

    /// Time spent since the call started, including sleeps
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Decide what to do after a failed attempt of the given kind
    pub fn on_failure(&mut self, kind: ExtractionErrorKind) -> RetryDecision {
        if !kind.is_retryable() {
            return RetryDecision::Stop(StopReason::NotRetryable);
        }
        if self.retries_used >= self.policy.max_retries {
            return RetryDecision::Stop(StopReason::Exhausted);
        }

        let delay = self.policy.delay_for(self.retries_used);
        if let Some(budget) = self.policy.max_elapsed {
            if self.elapsed().saturating_add(delay) > budget {
                return RetryDecision::Stop(StopReason::BudgetExceeded);
            }
        }

        self.retries_used += 1;
        RetryDecision::RetryAfter(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_doubles() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(
            policy.schedule(),
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
            ]
        );
    }

    #[test]
    fn test_delay_saturates_instead_of_overflowing() {
        let policy = BackoffPolicy {
            max_retries: 200,
            ..Default::default()
        };
        assert!(policy.delay_for(150) >= policy.delay_for(20));
    }

    #[tokio::test]
    async fn test_auth_failure_stops_immediately() {
        let policy = BackoffPolicy::default();
        let mut state = RetryState::start(&policy);
        assert_eq!(
            state.on_failure(ExtractionErrorKind::AuthFailure),
            RetryDecision::Stop(StopReason::NotRetryable)
        );
        assert_eq!(state.attempt(), 0);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let policy = BackoffPolicy::default();
        let mut state = RetryState::start(&policy);

        let mut delays = Vec::new();
        while let RetryDecision::RetryAfter(delay) =
            state.on_failure(ExtractionErrorKind::Unclassified)
        {
            delays.push(delay);
        }

        assert_eq!(delays, policy.schedule());
        assert_eq!(
            state.on_failure(ExtractionErrorKind::ServerFault),
            RetryDecision::Stop(StopReason::Exhausted)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_budget_cuts_schedule_short() {
        let policy = BackoffPolicy {
            max_elapsed: Some(Duration::from_millis(2500)),
            ..Default::default()
        };
        let mut state = RetryState::start(&policy);

        // 0ms + 1000ms fits the budget
        assert_eq!(
            state.on_failure(ExtractionErrorKind::RateLimited),
            RetryDecision::RetryAfter(Duration::from_millis(1000))
        );
        tokio::time::sleep(Duration::from_millis(1000)).await;

        // 1000ms + 2000ms does not
        assert_eq!(
            state.on_failure(ExtractionErrorKind::RateLimited),
            RetryDecision::Stop(StopReason::BudgetExceeded)
        );
    }
}
