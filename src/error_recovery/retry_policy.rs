//! Retry budget and delay calculation for the retry strategies

use crate::error_recovery::patterns::RecoveryStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the engine's attempt cap combines with a pattern's own retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPolicy {
    /// The engine cap bounds every pattern; larger budgets are truncated
    #[default]
    CapAtEngineLimit,
    /// A pattern may extend past the engine cap up to its own budget
    HonorPattern,
}

/// Retry plan for one classified failure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub strategy: RecoveryStrategy,
    pub base_delay_seconds: f64,
    /// Total attempts allowed, first call included
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Combine the engine cap with the pattern budget
    pub fn new(
        strategy: RecoveryStrategy,
        base_delay_seconds: f64,
        pattern_max_retries: u32,
        engine_max_attempts: u32,
        policy: AttemptPolicy,
    ) -> Self {
        let max_attempts = match policy {
            AttemptPolicy::CapAtEngineLimit => engine_max_attempts.min(pattern_max_retries),
            AttemptPolicy::HonorPattern => engine_max_attempts.max(pattern_max_retries),
        };
        Self {
            strategy,
            base_delay_seconds,
            max_attempts,
        }
    }

    /// Check if another attempt is allowed after `attempt` failed
    pub fn allows_another(&self, attempt: u32) -> bool {
        self.strategy.is_retry() && attempt < self.max_attempts
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        strategy_delay(self.strategy, self.base_delay_seconds, attempt)
    }
}

/// Upper bound for any single retry delay
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60 * 60);

/// Sleep required by a strategy after the given failed attempt.
///
/// `None` for strategies that never loop back. Backoff doubles per attempt
/// (`base × 2^(attempt-1)`), fixed delay stays at `base`. Negative or NaN
/// bases count as zero; every delay is clamped to [`MAX_RETRY_DELAY`].
pub fn strategy_delay(
    strategy: RecoveryStrategy,
    base_delay_seconds: f64,
    attempt: u32,
) -> Option<Duration> {
    let base = base_delay_seconds.max(0.0);
    match strategy {
        RecoveryStrategy::RetryImmediate => Some(Duration::ZERO),
        RecoveryStrategy::RetryWithBackoff => {
            let exponent = attempt.saturating_sub(1).min(31) as i32;
            Some(clamped_delay(base * 2f64.powi(exponent)))
        }
        RecoveryStrategy::RetryAfterDelay => Some(clamped_delay(base)),
        _ => None,
    }
}

fn clamped_delay(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds)
        .map(|delay| delay.min(MAX_RETRY_DELAY))
        .unwrap_or(MAX_RETRY_DELAY)
}
