//! Failure classification against the pattern registry

use crate::error::OutreachError;
use crate::error_recovery::patterns::{
    ErrorCategory, ErrorPattern, ErrorSeverity, PatternRegistry,
};
use std::sync::Arc;
use tracing::trace;

/// Classification of a single failure
#[derive(Debug, Clone, Copy)]
pub struct Classification<'a> {
    /// Matched pattern, if any
    pub pattern: Option<&'a ErrorPattern>,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
}

/// Matches failures against an ordered pattern table
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    registry: Arc<PatternRegistry>,
}

impl ErrorClassifier {
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    /// First registered pattern matching the failure kind or message
    pub fn classify(&self, error: &OutreachError) -> Option<&ErrorPattern> {
        let kind = error.kind();
        let lowered = error.to_string().to_lowercase();

        let matched = self
            .registry
            .patterns()
            .iter()
            .find(|pattern| pattern.matches(kind, &lowered));

        if let Some(pattern) = matched {
            trace!(pattern = %pattern.name, kind = %kind, "Failure matched pattern");
        }
        matched
    }

    /// Classify, falling back to the generic heuristics when nothing matches
    pub fn classify_full(&self, error: &OutreachError) -> Classification<'_> {
        match self.classify(error) {
            Some(pattern) => Classification {
                pattern: Some(pattern),
                category: pattern.category,
                severity: pattern.severity,
            },
            None => {
                let category = heuristic_category(&error.to_string());
                Classification {
                    pattern: None,
                    category,
                    severity: heuristic_severity(category),
                }
            }
        }
    }
}

/// Generic category from message substrings
pub fn heuristic_category(message: &str) -> ErrorCategory {
    let lowered = message.to_lowercase();
    if lowered.contains("network") || lowered.contains("timeout") {
        ErrorCategory::Network
    } else if lowered.contains("rate limit") {
        ErrorCategory::ApiRateLimit
    } else if lowered.contains("unauthorized") || lowered.contains("forbidden") {
        ErrorCategory::Authentication
    } else {
        ErrorCategory::Unknown
    }
}

/// Generic severity: critical for auth failures, medium otherwise
pub fn heuristic_severity(category: ErrorCategory) -> ErrorSeverity {
    match category {
        ErrorCategory::Authentication => ErrorSeverity::Critical,
        _ => ErrorSeverity::Medium,
    }
}
