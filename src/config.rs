//! Engine configuration
//!
//! Defaults reproduce the fixed recovery policy: five HIGH/CRITICAL failures
//! open a breaker for five minutes, and a call gets at most three attempts.
//! [`EngineConfig::load`] layers an optional TOML file and
//! `OUTREACH_RESILIENCE_*` environment variables on top of the defaults.

use crate::error_recovery::circuit_breaker::{
    CircuitBreakerConfig, DEFAULT_FAILURE_THRESHOLD, DEFAULT_OPEN_COOLDOWN_SECS,
};
use crate::error_recovery::retry_policy::AttemptPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "OUTREACH_RESILIENCE";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Source could not be read or deserialized
    #[error("Configuration error: {0}")]
    Load(#[from] ::config::ConfigError),

    /// Values were read but are unusable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Recovery engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// HIGH/CRITICAL failures before a breaker opens
    pub failure_threshold: u32,
    /// How long an open breaker rejects calls
    #[serde(with = "humantime_serde")]
    pub open_cooldown: Duration,
    /// Attempts per call, first call included
    pub max_attempts: u32,
    /// How `max_attempts` combines with a pattern's `max_retries`
    pub attempt_policy: AttemptPolicy,
    /// Handled failures retained for statistics
    pub error_log_capacity: usize,
    /// Capture a backtrace into every error response
    pub capture_stack_traces: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            open_cooldown: Duration::from_secs(DEFAULT_OPEN_COOLDOWN_SECS as u64),
            max_attempts: 3,
            attempt_policy: AttemptPolicy::CapAtEngineLimit,
            error_log_capacity: 10_000,
            capture_stack_traces: true,
        }
    }
}

impl EngineConfig {
    /// Load from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let config: EngineConfig = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.error_log_capacity == 0 {
            return Err(ConfigError::Invalid(
                "error_log_capacity must be at least 1".to_string(),
            ));
        }
        chrono::Duration::from_std(self.open_cooldown)
            .map_err(|e| ConfigError::Invalid(format!("open_cooldown out of range: {e}")))?;
        Ok(())
    }

    /// Breaker settings derived from this configuration
    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            open_cooldown: chrono::Duration::from_std(self.open_cooldown)
                .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_OPEN_COOLDOWN_SECS)),
        }
    }
}
