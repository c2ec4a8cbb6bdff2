//! Per-operation circuit breakers
//!
//! Each `(service, operation)` pair owns a breaker keyed by
//! `"{service}.{operation}"`. Only HIGH and CRITICAL failures count towards
//! the threshold; once it is reached the breaker opens for a fixed cooldown,
//! then lets calls through half-open until a success closes it again.

use crate::error_recovery::patterns::ErrorSeverity;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Failures needed to open a breaker
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// How long an open breaker rejects calls
pub const DEFAULT_OPEN_COOLDOWN_SECS: i64 = 5 * 60;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Calls are rejected until the cooldown elapses
    Open,
    /// Cooldown elapsed, calls allowed until a success closes the breaker
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            open_cooldown: Duration::seconds(DEFAULT_OPEN_COOLDOWN_SECS),
        }
    }
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Calls rejected while open
    pub blocked_requests: u64,
    /// Times this breaker has opened
    pub circuit_open_count: u64,
}

/// Outcome of consulting a breaker before a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    Allow,
    Reject {
        next_attempt_at: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<DateTime<Utc>>,
    next_attempt_at: Option<DateTime<Utc>>,
    blocked_requests: u64,
    circuit_open_count: u64,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            next_attempt_at: None,
            blocked_requests: 0,
            circuit_open_count: 0,
        }
    }

    fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            state: self.state,
            failure_count: self.failure_count,
            last_failure_at: self.last_failure_at,
            next_attempt_at: self.next_attempt_at,
            blocked_requests: self.blocked_requests,
            circuit_open_count: self.circuit_open_count,
        }
    }
}

/// Breaker map shared by all callers of one engine
#[derive(Debug, Clone)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Arc<RwLock<HashMap<String, BreakerState>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Breaker key for an operation
    pub fn key(service: &str, operation: &str) -> String {
        format!("{service}.{operation}")
    }

    /// Check if a call may proceed
    pub async fn check(&self, key: &str) -> BreakerDecision {
        self.check_at(key, Utc::now()).await
    }

    /// [`Self::check`] against an explicit clock
    pub async fn check_at(&self, key: &str, now: DateTime<Utc>) -> BreakerDecision {
        {
            let breakers = self.breakers.read().await;
            match breakers.get(key) {
                None => return BreakerDecision::Allow,
                Some(b) if b.state != CircuitState::Open => return BreakerDecision::Allow,
                Some(_) => {}
            }
        }

        let mut breakers = self.breakers.write().await;
        let Some(breaker) = breakers.get_mut(key) else {
            return BreakerDecision::Allow;
        };

        match breaker.state {
            CircuitState::Open => match breaker.next_attempt_at {
                Some(deadline) if now < deadline => {
                    breaker.blocked_requests += 1;
                    debug!(breaker = key, "Circuit breaker open, blocking request");
                    BreakerDecision::Reject {
                        next_attempt_at: breaker.next_attempt_at,
                    }
                }
                _ => {
                    breaker.state = CircuitState::HalfOpen;
                    info!(breaker = key, "Circuit breaker transitioning to half-open");
                    BreakerDecision::Allow
                }
            },
            // State changed between the read and write lock
            CircuitState::Closed | CircuitState::HalfOpen => BreakerDecision::Allow,
        }
    }

    /// Record a success, closing the breaker
    pub async fn record_success(&self, key: &str) {
        {
            let breakers = self.breakers.read().await;
            match breakers.get(key) {
                None => return,
                Some(b) if b.state == CircuitState::Closed && b.failure_count == 0 => return,
                Some(_) => {}
            }
        }

        let mut breakers = self.breakers.write().await;
        if let Some(breaker) = breakers.get_mut(key) {
            if breaker.state != CircuitState::Closed {
                info!(breaker = key, "Circuit breaker closed after successful call");
            }
            breaker.state = CircuitState::Closed;
            breaker.failure_count = 0;
            breaker.next_attempt_at = None;
        }
    }

    /// Record a failure; returns the resulting state
    pub async fn record_failure(&self, key: &str, severity: ErrorSeverity) -> CircuitState {
        self.record_failure_at(key, severity, Utc::now()).await
    }

    /// [`Self::record_failure`] against an explicit clock
    pub async fn record_failure_at(
        &self,
        key: &str,
        severity: ErrorSeverity,
        now: DateTime<Utc>,
    ) -> CircuitState {
        if !severity.trips_breaker() {
            let breakers = self.breakers.read().await;
            return breakers
                .get(key)
                .map(|b| b.state)
                .unwrap_or(CircuitState::Closed);
        }

        let mut breakers = self.breakers.write().await;
        let breaker = breakers
            .entry(key.to_string())
            .or_insert_with(BreakerState::closed);

        breaker.failure_count += 1;
        breaker.last_failure_at = Some(now);

        if breaker.state != CircuitState::Open
            && breaker.failure_count >= self.config.failure_threshold
        {
            breaker.state = CircuitState::Open;
            breaker.next_attempt_at = Some(now + self.config.open_cooldown);
            breaker.circuit_open_count += 1;
            error!(
                breaker = key,
                failure_count = breaker.failure_count,
                next_attempt_at = ?breaker.next_attempt_at,
                "Circuit breaker opened"
            );
        } else {
            debug!(
                breaker = key,
                failure_count = breaker.failure_count,
                "Circuit breaker failure recorded"
            );
        }

        breaker.state
    }

    /// Whether callers are currently rejected
    pub async fn is_open(&self, key: &str) -> bool {
        let breakers = self.breakers.read().await;
        breakers
            .get(key)
            .is_some_and(|b| b.state == CircuitState::Open)
    }

    /// Snapshot of one breaker
    pub async fn status(&self, key: &str) -> Option<CircuitBreakerStats> {
        let breakers = self.breakers.read().await;
        breakers.get(key).map(BreakerState::stats)
    }

    /// Snapshot of every breaker
    pub async fn snapshot(&self) -> HashMap<String, CircuitBreakerStats> {
        let breakers = self.breakers.read().await;
        breakers
            .iter()
            .map(|(key, b)| (key.clone(), b.stats()))
            .collect()
    }

    /// Manually close one breaker
    pub async fn reset(&self, key: &str) {
        let mut breakers = self.breakers.write().await;
        if let Some(breaker) = breakers.get_mut(key) {
            breaker.state = CircuitState::Closed;
            breaker.failure_count = 0;
            breaker.next_attempt_at = None;
            info!(breaker = key, "Circuit breaker manually reset");
        }
    }

    /// Manually close every breaker
    pub async fn reset_all(&self) {
        let mut breakers = self.breakers.write().await;
        for (key, breaker) in breakers.iter_mut() {
            breaker.state = CircuitState::Closed;
            breaker.failure_count = 0;
            breaker.next_attempt_at = None;
            info!(breaker = %key, "Circuit breaker manually reset");
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "scraper.fetch_page";

    #[tokio::test]
    async fn test_opens_after_threshold_high_failures() {
        let registry = CircuitBreakerRegistry::default();

        for _ in 0..4 {
            assert_eq!(
                registry.record_failure(KEY, ErrorSeverity::High).await,
                CircuitState::Closed
            );
        }
        assert_eq!(
            registry.record_failure(KEY, ErrorSeverity::Critical).await,
            CircuitState::Open
        );

        let stats = registry.status(KEY).await.unwrap();
        assert_eq!(stats.failure_count, 5);
        assert_eq!(stats.circuit_open_count, 1);
        assert!(stats.next_attempt_at.is_some());
        assert!(registry.is_open(KEY).await);
    }

    #[tokio::test]
    async fn test_medium_and_low_failures_are_ignored() {
        let registry = CircuitBreakerRegistry::default();

        for _ in 0..4 {
            registry.record_failure(KEY, ErrorSeverity::High).await;
        }
        for _ in 0..10 {
            registry.record_failure(KEY, ErrorSeverity::Medium).await;
            registry.record_failure(KEY, ErrorSeverity::Low).await;
        }

        let stats = registry.status(KEY).await.unwrap();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 4);
    }

    #[tokio::test]
    async fn test_low_failures_create_no_breaker() {
        let registry = CircuitBreakerRegistry::default();
        registry.record_failure(KEY, ErrorSeverity::Low).await;
        assert!(registry.status(KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_half_open_after_cooldown() {
        let registry = CircuitBreakerRegistry::default();
        let opened_at = Utc::now();

        for _ in 0..5 {
            registry
                .record_failure_at(KEY, ErrorSeverity::High, opened_at)
                .await;
        }

        let before = opened_at + Duration::minutes(4);
        assert!(matches!(
            registry.check_at(KEY, before).await,
            BreakerDecision::Reject { .. }
        ));

        let after = opened_at + Duration::minutes(5) + Duration::seconds(1);
        assert_eq!(registry.check_at(KEY, after).await, BreakerDecision::Allow);
        assert_eq!(
            registry.status(KEY).await.unwrap().state,
            CircuitState::HalfOpen
        );

        registry.record_success(KEY).await;
        let stats = registry.status(KEY).await.unwrap();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.blocked_requests, 1);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let registry = CircuitBreakerRegistry::default();
        let opened_at = Utc::now();
        for _ in 0..5 {
            registry
                .record_failure_at(KEY, ErrorSeverity::High, opened_at)
                .await;
        }
        let later = opened_at + Duration::minutes(6);
        registry.check_at(KEY, later).await;

        let state = registry
            .record_failure_at(KEY, ErrorSeverity::High, later)
            .await;
        assert_eq!(state, CircuitState::Open);
        let stats = registry.status(KEY).await.unwrap();
        assert_eq!(stats.next_attempt_at, Some(later + Duration::minutes(5)));
        assert_eq!(stats.circuit_open_count, 2);
    }

    #[tokio::test]
    async fn test_breakers_are_isolated_per_key() {
        let registry = CircuitBreakerRegistry::default();
        for _ in 0..5 {
            registry.record_failure(KEY, ErrorSeverity::High).await;
        }
        assert!(registry.is_open(KEY).await);
        assert_eq!(
            registry.check("scraper.extract_people").await,
            BreakerDecision::Allow
        );
        assert_eq!(registry.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_manual_reset() {
        let registry = CircuitBreakerRegistry::default();
        for _ in 0..5 {
            registry.record_failure(KEY, ErrorSeverity::High).await;
        }
        registry.reset(KEY).await;
        assert_eq!(registry.check(KEY).await, BreakerDecision::Allow);

        for _ in 0..5 {
            registry.record_failure("a.b", ErrorSeverity::Critical).await;
        }
        registry.reset_all().await;
        assert!(!registry.is_open("a.b").await);
    }
}
