//! Recovery orchestrator
//!
//! [`RecoveryEngine::execute_with_recovery`] runs a unit of work under the
//! engine's full policy: circuit breaker gate, classification of every
//! failure, strategy dispatch (retry, fallback, skip, fail) and statistics.
//! One engine is built at startup and shared by every pipeline stage.

use crate::config::EngineConfig;
use crate::error::{OutreachError, RecoveryError};
use crate::error_recovery::circuit_breaker::{
    BreakerDecision, CircuitBreakerRegistry, CircuitBreakerStats,
};
use crate::error_recovery::classifier::ErrorClassifier;
use crate::error_recovery::patterns::{
    ErrorPattern, FallbackRegistry, PatternRegistry, RecoveryStrategy,
};
use crate::error_recovery::response::{ErrorResponse, ErrorResponseBuilder};
use crate::error_recovery::retry_policy::RetryPolicy;
use crate::error_recovery::statistics::{EngineCounters, ErrorLog, ErrorRecord, ErrorStatistics};
use chrono::Utc;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Caller-supplied key/value context attached to every error response
pub type OperationContext = HashMap<String, serde_json::Value>;

/// Degraded alternate implementation invoked once the primary path gives up
pub type FallbackFn<'a, T> = Box<dyn FnOnce() -> BoxFuture<'a, crate::Result<T>> + Send + 'a>;

/// Wrap an async closure as a [`FallbackFn`]
pub fn fallback<'a, T, F, Fut>(f: F) -> FallbackFn<'a, T>
where
    F: FnOnce() -> Fut + Send + 'a,
    Fut: Future<Output = crate::Result<T>> + Send + 'a,
{
    Box::new(move || Box::pin(f()))
}

/// Successful result of a recovered operation
#[derive(Debug)]
pub enum Outcome<T> {
    /// The work itself succeeded, possibly after retries
    Completed(T),
    /// The fallback produced the value
    Fallback(T),
    /// The failure was classified as skippable; nothing was produced
    Skipped(Box<ErrorResponse>),
}

impl<T> Outcome<T> {
    /// Produced value, `None` when skipped
    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Completed(value) | Outcome::Fallback(value) => Some(value),
            Outcome::Skipped(_) => None,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Completed(value) | Outcome::Fallback(value) => Some(value),
            Outcome::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Outcome::Fallback(_))
    }
}

/// Resilient execution engine
#[derive(Debug)]
pub struct RecoveryEngine {
    config: EngineConfig,
    responses: ErrorResponseBuilder,
    breakers: CircuitBreakerRegistry,
    error_log: RwLock<ErrorLog>,
}

impl RecoveryEngine {
    /// Engine with the built-in tables and default policy
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Engine with the built-in tables and a custom policy
    pub fn with_config(config: EngineConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> RecoveryEngineBuilder {
        RecoveryEngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `work` under the recovery policy for `service.operation`
    pub async fn execute_with_recovery<T, E, F, Fut>(
        &self,
        service: &str,
        operation: &str,
        context: Option<OperationContext>,
        mut work: F,
        fallback: Option<FallbackFn<'_, T>>,
    ) -> Result<Outcome<T>, RecoveryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<OutreachError>,
    {
        let key = CircuitBreakerRegistry::key(service, operation);
        self.update_counters(|c| c.total_executions += 1).await;

        if let BreakerDecision::Reject { next_attempt_at } = self.breakers.check(&key).await {
            warn!(
                service,
                operation,
                next_attempt_at = ?next_attempt_at,
                "Circuit breaker open, rejecting call"
            );
            self.update_counters(|c| c.circuit_rejections += 1).await;
            return Err(RecoveryError::CircuitOpen {
                service: service.to_string(),
                operation: operation.to_string(),
                next_attempt_at,
            });
        }

        let context = context.unwrap_or_default();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let error: OutreachError = match work().await {
                Ok(value) => {
                    self.breakers.record_success(&key).await;
                    self.update_counters(|c| {
                        if attempt == 1 {
                            c.successful_first_attempt += 1;
                        } else {
                            c.successful_after_retry += 1;
                        }
                    })
                    .await;
                    if attempt > 1 {
                        info!(service, operation, attempt, "Operation succeeded after retry");
                    }
                    return Ok(Outcome::Completed(value));
                }
                Err(error) => error.into(),
            };

            let response = self.handle_failure(&key, &error, service, operation, &context).await;

            match response.retry_strategy {
                RecoveryStrategy::SkipAndContinue => {
                    info!(
                        service,
                        operation,
                        error_id = %response.error_id,
                        "Skipping operation and continuing"
                    );
                    self.update_counters(|c| c.skipped_operations += 1).await;
                    return Ok(Outcome::Skipped(Box::new(response)));
                }
                RecoveryStrategy::UserIntervention => {
                    warn!(
                        service,
                        operation,
                        error_id = %response.error_id,
                        "User intervention required: {}",
                        response.user_message
                    );
                    self.update_counters(|c| c.terminal_failures += 1).await;
                    return Err(RecoveryError::UserInterventionRequired(Box::new(response)));
                }
                RecoveryStrategy::FailFast => {
                    return Err(self.terminal(response).await);
                }
                RecoveryStrategy::FallbackMethod => {
                    return self.fallback_or_terminal(response, fallback).await;
                }
                RecoveryStrategy::RetryImmediate
                | RecoveryStrategy::RetryWithBackoff
                | RecoveryStrategy::RetryAfterDelay => {
                    let policy = RetryPolicy::new(
                        response.retry_strategy,
                        response.retry_delay_seconds,
                        response.max_retries,
                        self.config.max_attempts,
                        self.config.attempt_policy,
                    );

                    if response.max_retries > policy.max_attempts {
                        debug!(
                            service,
                            operation,
                            pattern_max_retries = response.max_retries,
                            max_attempts = policy.max_attempts,
                            "Pattern retry budget truncated by engine attempt cap"
                        );
                    }

                    if !(response.should_retry && policy.allows_another(attempt)) {
                        return self.fallback_or_terminal(response, fallback).await;
                    }

                    let delay = policy.delay_for(attempt).unwrap_or_default();
                    self.update_counters(|c| c.total_retry_attempts += 1).await;
                    info!(
                        service,
                        operation,
                        attempt,
                        max_attempts = policy.max_attempts,
                        strategy = ?response.retry_strategy,
                        "Retrying after {:?}",
                        delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// [`Self::execute_with_recovery`] without context or fallback
    pub async fn execute<T, E, F, Fut>(
        &self,
        service: &str,
        operation: &str,
        work: F,
    ) -> Result<Outcome<T>, RecoveryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<OutreachError>,
    {
        self.execute_with_recovery(service, operation, None, work, None)
            .await
    }

    /// [`Self::execute_with_recovery`] with a fallback and no context
    pub async fn execute_with_fallback<'a, T, E, F, Fut>(
        &self,
        service: &str,
        operation: &str,
        work: F,
        fallback: FallbackFn<'a, T>,
    ) -> Result<Outcome<T>, RecoveryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<OutreachError>,
    {
        self.execute_with_recovery(service, operation, None, work, Some(fallback))
            .await
    }

    /// Classify a failure against the pattern table
    pub fn classify(&self, error: &OutreachError) -> Option<&ErrorPattern> {
        self.responses.classifier().classify(error)
    }

    /// Build, log and record an error response without executing anything.
    ///
    /// Used by collaborators that catch failures themselves but still want the
    /// uniform report and breaker accounting.
    pub async fn report_failure(
        &self,
        error: &OutreachError,
        service: &str,
        operation: &str,
        context: Option<OperationContext>,
    ) -> ErrorResponse {
        let key = CircuitBreakerRegistry::key(service, operation);
        self.handle_failure(&key, error, service, operation, &context.unwrap_or_default())
            .await
    }

    /// Windowed error report
    pub async fn get_statistics(&self, window_hours: u32) -> ErrorStatistics {
        let breakers = self.breakers.snapshot().await;
        let log = self.error_log.read().await;
        log.summarize(window_hours, Utc::now(), breakers)
    }

    /// Current engine counters
    pub async fn counters(&self) -> EngineCounters {
        self.error_log.read().await.counters().clone()
    }

    /// Drop retained error records and counters
    pub async fn clear_statistics(&self) {
        self.error_log.write().await.clear();
        info!("Cleared error statistics");
    }

    pub async fn circuit_breaker_status(
        &self,
        service: &str,
        operation: &str,
    ) -> Option<CircuitBreakerStats> {
        self.breakers
            .status(&CircuitBreakerRegistry::key(service, operation))
            .await
    }

    pub async fn circuit_breakers(&self) -> HashMap<String, CircuitBreakerStats> {
        self.breakers.snapshot().await
    }

    /// Operator override: close a breaker immediately
    pub async fn reset_circuit_breaker(&self, service: &str, operation: &str) {
        self.breakers
            .reset(&CircuitBreakerRegistry::key(service, operation))
            .await;
    }

    pub async fn reset_all_circuit_breakers(&self) {
        self.breakers.reset_all().await;
    }

    async fn handle_failure(
        &self,
        key: &str,
        error: &OutreachError,
        service: &str,
        operation: &str,
        context: &OperationContext,
    ) -> ErrorResponse {
        let response = self.responses.build(error, service, operation, context);
        self.breakers.record_failure(key, response.severity).await;
        self.error_log
            .write()
            .await
            .push(ErrorRecord::from(&response));
        response
    }

    async fn fallback_or_terminal<T>(
        &self,
        response: ErrorResponse,
        fallback: Option<FallbackFn<'_, T>>,
    ) -> Result<Outcome<T>, RecoveryError> {
        match fallback {
            Some(fallback) if response.fallback_available => {
                info!(
                    service = %response.service,
                    operation = %response.operation,
                    error_id = %response.error_id,
                    "Using fallback"
                );
                self.update_counters(|c| c.fallbacks_used += 1).await;
                match fallback().await {
                    Ok(value) => Ok(Outcome::Fallback(value)),
                    Err(source) => Err(RecoveryError::Fallback {
                        response: Box::new(response),
                        source,
                    }),
                }
            }
            Some(_) => {
                debug!(
                    service = %response.service,
                    operation = %response.operation,
                    "Fallback supplied but not registered for this operation"
                );
                Err(self.terminal(response).await)
            }
            None => Err(self.terminal(response).await),
        }
    }

    async fn terminal(&self, response: ErrorResponse) -> RecoveryError {
        self.update_counters(|c| c.terminal_failures += 1).await;
        warn!(
            service = %response.service,
            operation = %response.operation,
            error_id = %response.error_id,
            "Operation failed: {}",
            response.user_message
        );
        RecoveryError::Terminal(Box::new(response))
    }

    async fn update_counters<F: FnOnce(&mut EngineCounters)>(&self, update: F) {
        let mut log = self.error_log.write().await;
        update(&mut log.counters);
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`RecoveryEngine`]
#[derive(Debug, Default)]
pub struct RecoveryEngineBuilder {
    config: EngineConfig,
    patterns: Option<PatternRegistry>,
    fallbacks: Option<FallbackRegistry>,
}

impl RecoveryEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the engine policy
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the built-in pattern table
    pub fn patterns(mut self, patterns: PatternRegistry) -> Self {
        self.patterns = Some(patterns);
        self
    }

    /// Replace the built-in fallback allow-list
    pub fn fallbacks(mut self, fallbacks: FallbackRegistry) -> Self {
        self.fallbacks = Some(fallbacks);
        self
    }

    pub fn build(self) -> RecoveryEngine {
        let patterns = Arc::new(self.patterns.unwrap_or_default());
        let fallbacks = Arc::new(self.fallbacks.unwrap_or_default());

        info!(
            patterns = patterns.len(),
            max_attempts = self.config.max_attempts,
            failure_threshold = self.config.failure_threshold,
            "Recovery engine initialized"
        );

        RecoveryEngine {
            responses: ErrorResponseBuilder::new(
                ErrorClassifier::new(patterns),
                fallbacks,
                self.config.capture_stack_traces,
            ),
            breakers: CircuitBreakerRegistry::new(self.config.circuit_breaker()),
            error_log: RwLock::new(ErrorLog::new(self.config.error_log_capacity)),
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn engine() -> RecoveryEngine {
        RecoveryEngine::with_config(EngineConfig {
            capture_stack_traces: false,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let engine = engine();
        let outcome = engine
            .execute("scraper", "fetch_page", || async {
                Ok::<_, OutreachError>("<html>")
            })
            .await
            .unwrap();

        assert_eq!(outcome.into_value(), Some("<html>"));
        let counters = engine.counters().await;
        assert_eq!(counters.total_executions, 1);
        assert_eq!(counters.successful_first_attempt, 1);
        assert!(engine.circuit_breakers().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_immediate_does_not_sleep() {
        let registry = PatternRegistry::new(vec![ErrorPattern::new(
            "flaky",
            crate::ErrorCategory::Network,
            crate::ErrorSeverity::Medium,
            RecoveryStrategy::RetryImmediate,
        )
        .messages(["flaky"])]);
        let engine = RecoveryEngine::builder()
            .config(EngineConfig {
                capture_stack_traces: false,
                ..Default::default()
            })
            .patterns(registry)
            .build();

        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();
        let result = engine
            .execute("svc", "op", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(OutreachError::other("flaky upstream"))
                }
            })
            .await;

        assert!(matches!(result, Err(RecoveryError::Terminal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), std::time::Duration::ZERO);
        assert_eq!(engine.counters().await.total_retry_attempts, 2);
    }

    #[tokio::test]
    async fn test_fallback_used_for_storage_failure() {
        let engine = engine();
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = engine
            .execute_with_fallback(
                "storage",
                "save_company",
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<&str, _>(OutreachError::storage("write conflict on companies"))
                    }
                },
                fallback(|| async { Ok("spooled") }),
            )
            .await
            .unwrap();

        assert!(outcome.is_fallback());
        assert_eq!(outcome.into_value(), Some("spooled"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.counters().await.fallbacks_used, 1);
    }

    #[tokio::test]
    async fn test_fallback_ignored_when_not_registered() {
        let engine = engine();
        let result = engine
            .execute_with_fallback(
                "storage",
                "drop_collection",
                || async { Err::<&str, _>(OutreachError::storage("write conflict")) },
                fallback(|| async { Ok("should not run") }),
            )
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RecoveryError::Terminal(_)));
        assert!(!err.response().unwrap().fallback_available);
    }

    #[tokio::test]
    async fn test_fallback_failure_propagates() {
        let engine = engine();
        let result = engine
            .execute_with_fallback(
                "storage",
                "save_contact",
                || async { Err::<(), _>(OutreachError::storage("duplicate key")) },
                fallback(|| async { Err(OutreachError::other("spool directory missing")) }),
            )
            .await;

        match result {
            Err(RecoveryError::Fallback { response, source }) => {
                assert_eq!(response.pattern.as_deref(), Some("storage_write_failed"));
                assert!(source.to_string().contains("spool directory missing"));
            }
            other => panic!("expected fallback error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_infinite_pattern_delay_is_clamped() {
        let registry = PatternRegistry::new(vec![ErrorPattern::new(
            "unbounded_wait",
            crate::ErrorCategory::ApiRateLimit,
            crate::ErrorSeverity::Medium,
            RecoveryStrategy::RetryAfterDelay,
        )
        .messages(["slow down"])
        .retries(2, f64::INFINITY)]);
        let engine = RecoveryEngine::builder()
            .config(EngineConfig {
                capture_stack_traces: false,
                ..Default::default()
            })
            .patterns(registry)
            .build();

        let start = tokio::time::Instant::now();
        let result = engine
            .execute("ai_writer", "draft_message", || async {
                Err::<(), _>(OutreachError::other("slow down"))
            })
            .await;

        assert!(matches!(result, Err(RecoveryError::Terminal(_))));
        // One clamped wait between the two attempts
        let elapsed = start.elapsed();
        let ceiling = crate::error_recovery::MAX_RETRY_DELAY;
        assert!(elapsed >= ceiling);
        assert!(elapsed < ceiling + std::time::Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_report_failure_records_statistics() {
        let engine = engine();
        let response = engine
            .report_failure(
                &OutreachError::scraping("stale element reference"),
                "scraper",
                "extract_people",
                None,
            )
            .await;
        assert_eq!(response.pattern.as_deref(), Some("scraping_failed"));

        let stats = engine.get_statistics(1).await;
        assert_eq!(stats.total_errors, 1);
        assert_eq!(stats.by_service["scraper"], 1);

        engine.clear_statistics().await;
        assert_eq!(engine.get_statistics(1).await.total_errors, 0);
    }
}
