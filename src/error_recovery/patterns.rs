//! Static failure-signature tables
//!
//! The pattern registry maps known failure signatures (kind + message
//! substrings) to a classification and a recovery policy. The fallback
//! registry lists the `(service, operation)` pairs that ship a degraded
//! alternate implementation. Both are plain data built once when the engine
//! starts.

use crate::error::FailureKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Network,
    ApiRateLimit,
    Authentication,
    DataValidation,
    Scraping,
    Storage,
    Unknown,
}

/// Error severity levels, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    /// Expected, per-record problems
    Low,
    /// Transient conditions
    Medium,
    /// Dependency failures that count towards the circuit breaker
    High,
    /// Immediate attention required
    Critical,
}

impl ErrorSeverity {
    /// Only HIGH and CRITICAL failures move a circuit breaker
    pub fn trips_breaker(&self) -> bool {
        *self >= ErrorSeverity::High
    }
}

/// Recovery strategies applied to a classified failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryStrategy {
    RetryImmediate,
    RetryWithBackoff,
    RetryAfterDelay,
    FallbackMethod,
    SkipAndContinue,
    FailFast,
    UserIntervention,
}

impl RecoveryStrategy {
    /// Strategies that loop back to another attempt
    pub fn is_retry(&self) -> bool {
        matches!(
            self,
            RecoveryStrategy::RetryImmediate
                | RecoveryStrategy::RetryWithBackoff
                | RecoveryStrategy::RetryAfterDelay
        )
    }
}

/// User-facing guidance for a category
#[derive(Debug, Clone, Copy)]
pub struct CategoryGuidance {
    pub user_message: &'static str,
    pub suggested_actions: &'static [&'static str],
    pub default_strategy: RecoveryStrategy,
}

impl ErrorCategory {
    /// Category guidance used whenever a pattern does not carry its own text
    pub fn guidance(&self) -> CategoryGuidance {
        match self {
            ErrorCategory::Network => CategoryGuidance {
                user_message: "A network problem interrupted the operation. It will be retried automatically.",
                suggested_actions: &[
                    "Check your internet connection",
                    "Verify the remote service is reachable",
                    "Retry the operation in a few minutes",
                ],
                default_strategy: RecoveryStrategy::RetryWithBackoff,
            },
            ErrorCategory::ApiRateLimit => CategoryGuidance {
                user_message: "An API rate limit was reached. The operation will resume once the limit resets.",
                suggested_actions: &[
                    "Wait for the rate-limit window to reset",
                    "Reduce request concurrency",
                    "Review the API plan quota",
                ],
                default_strategy: RecoveryStrategy::RetryAfterDelay,
            },
            ErrorCategory::Authentication => CategoryGuidance {
                user_message: "Authentication failed. Please check your credentials before retrying.",
                suggested_actions: &[
                    "Check credentials and API keys",
                    "Verify the key has not expired or been revoked",
                    "Update the configuration and restart the run",
                ],
                default_strategy: RecoveryStrategy::UserIntervention,
            },
            ErrorCategory::DataValidation => CategoryGuidance {
                user_message: "A record failed validation and was skipped.",
                suggested_actions: &[
                    "Review the input record",
                    "Correct the data format and re-run the record",
                ],
                default_strategy: RecoveryStrategy::SkipAndContinue,
            },
            ErrorCategory::Scraping => CategoryGuidance {
                user_message: "The page could not be scraped. It will be retried automatically.",
                suggested_actions: &[
                    "Check that the target site is available",
                    "Verify the page structure has not changed",
                ],
                default_strategy: RecoveryStrategy::RetryWithBackoff,
            },
            ErrorCategory::Storage => CategoryGuidance {
                user_message: "The data store rejected the operation. A fallback path will be used if available.",
                suggested_actions: &[
                    "Check the database connection settings",
                    "Verify available storage and permissions",
                ],
                default_strategy: RecoveryStrategy::FallbackMethod,
            },
            ErrorCategory::Unknown => CategoryGuidance {
                user_message: "An unexpected error occurred.",
                suggested_actions: &[
                    "Check the logs for detailed error information",
                    "Retry the operation",
                ],
                default_strategy: RecoveryStrategy::RetryWithBackoff,
            },
        }
    }
}

/// A registered failure signature
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPattern {
    pub name: String,
    /// Empty means kind-agnostic
    pub match_kinds: Vec<FailureKind>,
    /// Lower-case substrings, any match qualifies
    pub message_patterns: Vec<String>,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub strategy: RecoveryStrategy,
    pub max_retries: u32,
    pub retry_delay_seconds: f64,
    pub user_message: String,
    pub suggested_actions: Vec<String>,
}

impl ErrorPattern {
    /// Create a pattern with default retry settings (3 retries, 1s delay)
    pub fn new(
        name: &str,
        category: ErrorCategory,
        severity: ErrorSeverity,
        strategy: RecoveryStrategy,
    ) -> Self {
        Self {
            name: name.to_string(),
            match_kinds: Vec::new(),
            message_patterns: Vec::new(),
            category,
            severity,
            strategy,
            max_retries: 3,
            retry_delay_seconds: 1.0,
            user_message: String::new(),
            suggested_actions: Vec::new(),
        }
    }

    /// Restrict the pattern to failure kinds
    pub fn kinds<I: IntoIterator<Item = FailureKind>>(mut self, kinds: I) -> Self {
        self.match_kinds.extend(kinds);
        self
    }

    /// Add message substrings (matched case-insensitively)
    pub fn messages<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.message_patterns
            .extend(patterns.into_iter().map(|p| p.as_ref().to_lowercase()));
        self
    }

    /// Set retry budget and base delay
    pub fn retries(mut self, max_retries: u32, retry_delay_seconds: f64) -> Self {
        self.max_retries = max_retries;
        self.retry_delay_seconds = retry_delay_seconds;
        self
    }

    /// Set user-facing text
    pub fn user_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.user_message = msg.into();
        self
    }

    /// Set suggested actions
    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggested_actions
            .extend(actions.into_iter().map(Into::into));
        self
    }

    /// Check whether a failure matches this signature
    pub fn matches(&self, kind: FailureKind, lowered_message: &str) -> bool {
        if !self.match_kinds.is_empty() && self.match_kinds.contains(&kind) {
            return true;
        }
        self.message_patterns
            .iter()
            .any(|p| lowered_message.contains(p.as_str()))
    }
}

/// Ordered pattern table; declaration order is the tie-break
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    patterns: Vec<ErrorPattern>,
}

impl PatternRegistry {
    /// Build a registry from an explicit table
    pub fn new(patterns: Vec<ErrorPattern>) -> Self {
        Self { patterns }
    }

    /// Patterns in declaration order
    pub fn patterns(&self) -> &[ErrorPattern] {
        &self.patterns
    }

    /// Look up a pattern by name
    pub fn get(&self, name: &str) -> Option<&ErrorPattern> {
        self.patterns.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for PatternRegistry {
    /// The built-in outreach pipeline table. Specific signatures come first.
    fn default() -> Self {
        Self::new(vec![
            ErrorPattern::new(
                "connection_timeout",
                ErrorCategory::Network,
                ErrorSeverity::Medium,
                RecoveryStrategy::RetryWithBackoff,
            )
            .kinds([FailureKind::Timeout, FailureKind::Connection])
            .messages([
                "connection timeout",
                "timed out",
                "connection refused",
                "connection reset",
            ])
            .retries(3, 2.0)
            .user_message("Network connection timed out. Retrying automatically.")
            .actions([
                "Check your internet connection",
                "Verify the target service is up",
            ]),
            ErrorPattern::new(
                "rate_limit_exceeded",
                ErrorCategory::ApiRateLimit,
                ErrorSeverity::Medium,
                RecoveryStrategy::RetryAfterDelay,
            )
            .kinds([FailureKind::RateLimit])
            .messages(["rate limit", "429", "too many requests", "quota exceeded"])
            .retries(5, 60.0)
            .user_message("API rate limit exceeded. Waiting before retrying.")
            .actions([
                "Wait for the rate-limit reset",
                "Lower the number of concurrent requests",
            ]),
            ErrorPattern::new(
                "authentication_failed",
                ErrorCategory::Authentication,
                ErrorSeverity::Critical,
                RecoveryStrategy::UserIntervention,
            )
            .kinds([FailureKind::Authentication])
            .messages([
                "401",
                "unauthorized",
                "invalid api key",
                "authentication failed",
                "invalid credentials",
            ])
            .retries(0, 0.0)
            .user_message("Authentication failed. Update the credentials for this service.")
            .actions([
                "Check credentials in the configuration",
                "Regenerate the API key if it was revoked",
            ]),
            ErrorPattern::new(
                "ai_service_unavailable",
                ErrorCategory::Network,
                ErrorSeverity::High,
                RecoveryStrategy::RetryWithBackoff,
            )
            .kinds([FailureKind::AiProvider])
            .messages(["service unavailable", "503", "overloaded", "bad gateway"])
            .retries(3, 5.0),
            ErrorPattern::new(
                "scraping_failed",
                ErrorCategory::Scraping,
                ErrorSeverity::Medium,
                RecoveryStrategy::RetryWithBackoff,
            )
            .kinds([FailureKind::Scraping])
            .messages([
                "element not found",
                "stale element",
                "webdriver",
                "page load",
            ])
            .retries(2, 3.0),
            ErrorPattern::new(
                "storage_write_failed",
                ErrorCategory::Storage,
                ErrorSeverity::High,
                RecoveryStrategy::FallbackMethod,
            )
            .kinds([FailureKind::Storage])
            .messages(["write conflict", "duplicate key", "database unavailable"])
            .retries(1, 1.0),
            ErrorPattern::new(
                "email_rejected",
                ErrorCategory::DataValidation,
                ErrorSeverity::Low,
                RecoveryStrategy::SkipAndContinue,
            )
            .kinds([FailureKind::EmailDelivery])
            .messages(["mailbox unavailable", "recipient rejected", "bounced"])
            .user_message("The recipient address was rejected. The message was skipped.")
            .actions(["Verify the recipient address", "Remove the contact from the campaign"]),
            ErrorPattern::new(
                "validation_error",
                ErrorCategory::DataValidation,
                ErrorSeverity::Low,
                RecoveryStrategy::SkipAndContinue,
            )
            .kinds([FailureKind::Validation, FailureKind::Json])
            .messages(["invalid", "validation failed", "malformed"])
            .retries(0, 0.0),
            ErrorPattern::new(
                "resource_exhausted",
                ErrorCategory::Unknown,
                ErrorSeverity::Critical,
                RecoveryStrategy::FailFast,
            )
            .kinds([FailureKind::OutOfMemory])
            .messages(["out of memory", "no space left"])
            .retries(0, 0.0),
        ])
    }
}

/// Allow-list of operations with a degraded alternate implementation
#[derive(Debug, Clone)]
pub struct FallbackRegistry {
    available: HashSet<(String, String)>,
}

impl FallbackRegistry {
    /// Build from `(service, operation)` pairs
    pub fn new<I, S, O>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, O)>,
        S: Into<String>,
        O: Into<String>,
    {
        Self {
            available: pairs
                .into_iter()
                .map(|(s, o)| (s.into(), o.into()))
                .collect(),
        }
    }

    /// Registry with no fallbacks
    pub fn empty() -> Self {
        Self {
            available: HashSet::new(),
        }
    }

    /// Unlisted pairs report `false`
    pub fn is_available(&self, service: &str, operation: &str) -> bool {
        self.available
            .contains(&(service.to_string(), operation.to_string()))
    }
}

impl Default for FallbackRegistry {
    fn default() -> Self {
        Self::new([
            // Regex extraction when the model cannot be reached
            ("ai_parser", "parse_company_info"),
            ("ai_parser", "extract_people"),
            // Template drafts instead of generated copy
            ("ai_writer", "draft_message"),
            // Pattern-guessed addresses instead of the lookup API
            ("email_finder", "find_email"),
            // Local spool file while the document store is down
            ("storage", "save_company"),
            ("storage", "save_contact"),
        ])
    }
}
