//! Error classification and recovery for the outreach pipeline
//!
//! Failures are matched against a pattern table, turned into structured
//! [`ErrorResponse`]s and handled according to the matched strategy, with a
//! per-operation circuit breaker shielding unhealthy dependencies.

pub mod circuit_breaker;
pub mod classifier;
pub mod patterns;
pub mod resilience_manager;
pub mod response;
pub mod retry_policy;
pub mod statistics;

// Re-export commonly used types
pub use circuit_breaker::{
    BreakerDecision, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStats,
    CircuitState,
};
pub use classifier::{Classification, ErrorClassifier};
pub use patterns::{
    CategoryGuidance, ErrorCategory, ErrorPattern, ErrorSeverity, FallbackRegistry,
    PatternRegistry, RecoveryStrategy,
};
pub use resilience_manager::{
    fallback, FallbackFn, OperationContext, Outcome, RecoveryEngine, RecoveryEngineBuilder,
};
pub use response::{ErrorResponse, ErrorResponseBuilder, TechnicalDetails};
pub use retry_policy::{AttemptPolicy, RetryPolicy, MAX_RETRY_DELAY};
pub use statistics::{EngineCounters, ErrorLog, ErrorRecord, ErrorStatistics};
