//! Resilient operation execution for the outreach pipeline
//!
//! Every external interaction (scraping, AI providers, email lookup, storage)
//! runs through a shared [`RecoveryEngine`], which classifies failures,
//! retries with backoff, falls back, skips or fails, and trips per-operation
//! circuit breakers on repeated severe failures.
//!
//! ```no_run
//! use outreach_resilience::{OutreachError, RecoveryEngine};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = RecoveryEngine::new();
//! let page = engine
//!     .execute("scraper", "fetch_page", || async {
//!         Ok::<_, OutreachError>("<html></html>".to_string())
//!     })
//!     .await?
//!     .into_value();
//! println!("{page:?}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod error_recovery;
pub mod logging;

// Re-export main types for convenience
pub use config::{ConfigError, EngineConfig};
pub use error::{FailureKind, OutreachError, RecoveryError, Result};
pub use error_recovery::{
    fallback, AttemptPolicy, CircuitState, ErrorCategory, ErrorResponse, ErrorSeverity,
    ErrorStatistics, Outcome, RecoveryEngine, RecoveryStrategy,
};
