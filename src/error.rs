//! Error types for the outreach resilience engine
//!
//! Two layers live here. [`OutreachError`] is the failure surface of the
//! pipeline collaborators (scraper pool, AI providers, document store, email
//! sender) as it flows into the engine. [`RecoveryError`] is what the engine
//! hands back to callers once recovery has given up.

use crate::error_recovery::response::ErrorResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for collaborator operations
pub type Result<T> = std::result::Result<T, OutreachError>;

/// Failures raised by pipeline collaborators
#[derive(Error, Debug)]
pub enum OutreachError {
    /// Connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Invalid input or record data
    #[error("Validation error: {0}")]
    Validation(String),

    /// Scraping driver errors
    #[error("Scraping error: {0}")]
    Scraping(String),

    /// Document store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// AI provider errors, optionally carrying the provider's status/code
    #[error("AI provider error: {message}")]
    AiProvider {
        message: String,
        status: Option<u16>,
        code: Option<String>,
    },

    /// Email delivery errors
    #[error("Email delivery error: {0}")]
    EmailDelivery(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Process interrupt (Ctrl-C, shutdown signal)
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// Allocation failure reported by a collaborator
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// Generic errors
    #[error("{0}")]
    Generic(#[from] anyhow::Error),
}

/// Failure-kind discriminator used by the pattern registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Connection,
    Timeout,
    Authentication,
    RateLimit,
    Validation,
    Scraping,
    Storage,
    AiProvider,
    EmailDelivery,
    Http,
    Json,
    Io,
    Interrupted,
    OutOfMemory,
    Generic,
}

impl FailureKind {
    /// Stable name used in technical details and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Connection => "connection_error",
            FailureKind::Timeout => "timeout_error",
            FailureKind::Authentication => "authentication_error",
            FailureKind::RateLimit => "rate_limit_error",
            FailureKind::Validation => "validation_error",
            FailureKind::Scraping => "scraping_error",
            FailureKind::Storage => "storage_error",
            FailureKind::AiProvider => "ai_provider_error",
            FailureKind::EmailDelivery => "email_delivery_error",
            FailureKind::Http => "http_error",
            FailureKind::Json => "json_error",
            FailureKind::Io => "io_error",
            FailureKind::Interrupted => "interrupted",
            FailureKind::OutOfMemory => "out_of_memory",
            FailureKind::Generic => "generic_error",
        }
    }

    /// Terminal kinds are never retried, whatever pattern they match
    pub fn is_terminal(&self) -> bool {
        matches!(self, FailureKind::Interrupted | FailureKind::OutOfMemory)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OutreachError {
    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an authentication error
    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limit<S: Into<String>>(msg: S) -> Self {
        Self::RateLimit(msg.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a scraping error
    pub fn scraping<S: Into<String>>(msg: S) -> Self {
        Self::Scraping(msg.into())
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an AI provider error without status details
    pub fn ai_provider<S: Into<String>>(msg: S) -> Self {
        Self::AiProvider {
            message: msg.into(),
            status: None,
            code: None,
        }
    }

    /// Create an AI provider error carrying the HTTP status and vendor code
    pub fn ai_provider_status<S: Into<String>>(msg: S, status: u16, code: Option<String>) -> Self {
        Self::AiProvider {
            message: msg.into(),
            status: Some(status),
            code,
        }
    }

    /// Create an email delivery error
    pub fn email_delivery<S: Into<String>>(msg: S) -> Self {
        Self::EmailDelivery(msg.into())
    }

    /// Create an interrupt error
    pub fn interrupted<S: Into<String>>(msg: S) -> Self {
        Self::Interrupted(msg.into())
    }

    /// Create an out-of-memory error
    pub fn out_of_memory<S: Into<String>>(msg: S) -> Self {
        Self::OutOfMemory(msg.into())
    }

    /// Create a generic error from a bare message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Generic(anyhow::anyhow!(msg.into()))
    }

    /// Failure-kind discriminator
    pub fn kind(&self) -> FailureKind {
        match self {
            OutreachError::Connection(_) => FailureKind::Connection,
            OutreachError::Timeout(_) => FailureKind::Timeout,
            OutreachError::Authentication(_) => FailureKind::Authentication,
            OutreachError::RateLimit(_) => FailureKind::RateLimit,
            OutreachError::Validation(_) => FailureKind::Validation,
            OutreachError::Scraping(_) => FailureKind::Scraping,
            OutreachError::Storage(_) => FailureKind::Storage,
            OutreachError::AiProvider { .. } => FailureKind::AiProvider,
            OutreachError::EmailDelivery(_) => FailureKind::EmailDelivery,
            OutreachError::Http(_) => FailureKind::Http,
            OutreachError::Json(_) => FailureKind::Json,
            OutreachError::Io(_) => FailureKind::Io,
            OutreachError::Interrupted(_) => FailureKind::Interrupted,
            OutreachError::OutOfMemory(_) => FailureKind::OutOfMemory,
            OutreachError::Generic(_) => FailureKind::Generic,
        }
    }

    /// Raw failure text without the variant prefix
    pub fn raw_message(&self) -> String {
        match self {
            OutreachError::Connection(msg)
            | OutreachError::Timeout(msg)
            | OutreachError::Authentication(msg)
            | OutreachError::RateLimit(msg)
            | OutreachError::Validation(msg)
            | OutreachError::Scraping(msg)
            | OutreachError::Storage(msg)
            | OutreachError::EmailDelivery(msg)
            | OutreachError::Interrupted(msg)
            | OutreachError::OutOfMemory(msg) => msg.clone(),
            OutreachError::AiProvider { message, .. } => message.clone(),
            OutreachError::Http(err) => err.to_string(),
            OutreachError::Json(err) => err.to_string(),
            OutreachError::Io(err) => err.to_string(),
            OutreachError::Generic(err) => err.to_string(),
        }
    }

    /// HTTP status attached to the failure, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            OutreachError::Http(err) => err.status().map(|s| s.as_u16()),
            OutreachError::AiProvider { status, .. } => *status,
            _ => None,
        }
    }

    /// Vendor error code attached to the failure, if any
    pub fn provider_code(&self) -> Option<String> {
        match self {
            OutreachError::AiProvider { code, .. } => code.clone(),
            OutreachError::Io(err) => err.raw_os_error().map(|c| c.to_string()),
            _ => None,
        }
    }
}

/// Errors returned by [`crate::RecoveryEngine::execute_with_recovery`]
#[derive(Error, Debug)]
pub enum RecoveryError {
    /// The breaker for this operation is open; the work was not invoked
    #[error("circuit breaker open for {service}.{operation}")]
    CircuitOpen {
        service: String,
        operation: String,
        next_attempt_at: Option<DateTime<Utc>>,
    },

    /// A human has to act (credentials, manual configuration) before retrying
    #[error("user intervention required: {}", .0.user_message)]
    UserInterventionRequired(Box<ErrorResponse>),

    /// Recovery gave up; carries the last handled failure
    #[error("operation failed: {}", .0.message)]
    Terminal(Box<ErrorResponse>),

    /// The fallback itself failed after the primary path was exhausted
    #[error("fallback failed: {source}")]
    Fallback {
        response: Box<ErrorResponse>,
        #[source]
        source: OutreachError,
    },
}

impl RecoveryError {
    /// Last error response, when a failure was handled
    pub fn response(&self) -> Option<&ErrorResponse> {
        match self {
            RecoveryError::CircuitOpen { .. } => None,
            RecoveryError::UserInterventionRequired(response)
            | RecoveryError::Terminal(response)
            | RecoveryError::Fallback { response, .. } => Some(response),
        }
    }

    /// Check if the call was rejected by an open breaker
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, RecoveryError::CircuitOpen { .. })
    }

    /// Check if the failure needs a human
    pub fn requires_user_action(&self) -> bool {
        matches!(self, RecoveryError::UserInterventionRequired(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(OutreachError::timeout("x").kind(), FailureKind::Timeout);
        assert_eq!(
            OutreachError::ai_provider("x").kind(),
            FailureKind::AiProvider
        );
        assert_eq!(OutreachError::other("x").kind(), FailureKind::Generic);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(OutreachError::from(io).kind(), FailureKind::Io);
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(FailureKind::Interrupted.is_terminal());
        assert!(FailureKind::OutOfMemory.is_terminal());
        assert!(!FailureKind::Timeout.is_terminal());
    }

    #[test]
    fn test_raw_message_and_status() {
        let err = OutreachError::ai_provider_status(
            "model overloaded",
            503,
            Some("overloaded_error".to_string()),
        );
        assert_eq!(err.raw_message(), "model overloaded");
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(err.provider_code().as_deref(), Some("overloaded_error"));
        assert!(err.to_string().contains("AI provider error"));
    }

    #[test]
    fn test_circuit_open_message() {
        let err = RecoveryError::CircuitOpen {
            service: "scraper".to_string(),
            operation: "fetch_page".to_string(),
            next_attempt_at: None,
        };
        assert_eq!(
            err.to_string(),
            "circuit breaker open for scraper.fetch_page"
        );
        assert!(err.is_circuit_open());
        assert!(err.response().is_none());
    }
}
