//! Structured error reports
//!
//! Every failure handled by the engine produces one [`ErrorResponse`]: who
//! failed, how it was classified, what the engine will do about it and what a
//! person should do about it.

use crate::error::OutreachError;
use crate::error_recovery::classifier::ErrorClassifier;
use crate::error_recovery::patterns::{
    ErrorCategory, ErrorSeverity, FallbackRegistry, RecoveryStrategy,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Technical detail retained for logs and statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalDetails {
    pub kind: String,
    /// Full error rendering, variant prefix included
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Structured report for a handled failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_id: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub operation: String,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub message: String,
    pub technical_details: TechnicalDetails,
    pub should_retry: bool,
    pub retry_strategy: RecoveryStrategy,
    pub retry_delay_seconds: f64,
    pub max_retries: u32,
    pub fallback_available: bool,
    pub user_message: String,
    pub suggested_actions: Vec<String>,
    pub context: HashMap<String, serde_json::Value>,
    pub stack_trace: Option<String>,
    /// Name of the matched pattern
    pub pattern: Option<String>,
}

impl ErrorResponse {
    /// Key of the breaker this failure belongs to
    pub fn breaker_key(&self) -> String {
        format!("{}.{}", self.service, self.operation)
    }

    /// Format for API responses
    pub fn to_api_value(&self, include_details: bool) -> serde_json::Value {
        let mut response = serde_json::json!({
            "error": {
                "id": self.error_id,
                "category": self.category,
                "severity": self.severity,
                "message": self.user_message,
                "retryable": self.should_retry,
                "timestamp": self.timestamp,
                "suggested_actions": self.suggested_actions,
            }
        });

        if include_details {
            response["error"]["service"] = serde_json::Value::String(self.service.clone());
            response["error"]["operation"] = serde_json::Value::String(self.operation.clone());
            response["error"]["technical_details"] =
                serde_json::to_value(&self.technical_details).unwrap_or_default();
            if !self.context.is_empty() {
                response["error"]["context"] =
                    serde_json::to_value(&self.context).unwrap_or_default();
            }
        }

        response
    }
}

/// Assembles and logs error responses
#[derive(Debug, Clone)]
pub struct ErrorResponseBuilder {
    classifier: ErrorClassifier,
    fallbacks: Arc<FallbackRegistry>,
    capture_stack_traces: bool,
}

impl ErrorResponseBuilder {
    pub fn new(
        classifier: ErrorClassifier,
        fallbacks: Arc<FallbackRegistry>,
        capture_stack_traces: bool,
    ) -> Self {
        Self {
            classifier,
            fallbacks,
            capture_stack_traces,
        }
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Build the response for a failure and log it
    pub fn build(
        &self,
        error: &OutreachError,
        service: &str,
        operation: &str,
        context: &HashMap<String, serde_json::Value>,
    ) -> ErrorResponse {
        let response = self.assemble(error, service, operation, context);
        log_response(&response);
        response
    }

    fn assemble(
        &self,
        error: &OutreachError,
        service: &str,
        operation: &str,
        context: &HashMap<String, serde_json::Value>,
    ) -> ErrorResponse {
        let kind = error.kind();
        let classification = self.classifier.classify_full(error);
        let guidance = classification.category.guidance();

        let (strategy, max_retries, retry_delay_seconds) = match classification.pattern {
            Some(pattern) => (pattern.strategy, pattern.max_retries, pattern.retry_delay_seconds),
            None => (guidance.default_strategy, 3, 1.0),
        };

        let should_retry = !kind.is_terminal() && strategy.is_retry();
        // Terminal kinds cannot loop back, whatever the table says
        let strategy = if kind.is_terminal() && strategy.is_retry() {
            RecoveryStrategy::FailFast
        } else {
            strategy
        };

        let (user_message, suggested_actions) = match classification.pattern {
            Some(pattern) if !pattern.user_message.is_empty() => (
                pattern.user_message.clone(),
                if pattern.suggested_actions.is_empty() {
                    to_owned_actions(guidance.suggested_actions)
                } else {
                    pattern.suggested_actions.clone()
                },
            ),
            _ => (
                guidance.user_message.to_string(),
                to_owned_actions(guidance.suggested_actions),
            ),
        };

        let timestamp = Utc::now();

        ErrorResponse {
            error_id: format!("{}_{}_{}", service, operation, timestamp.timestamp()),
            timestamp,
            service: service.to_string(),
            operation: operation.to_string(),
            category: classification.category,
            severity: classification.severity,
            message: error.raw_message(),
            technical_details: TechnicalDetails {
                kind: kind.as_str().to_string(),
                message: error.to_string(),
                status_code: error.status_code(),
                code: error.provider_code(),
            },
            should_retry,
            retry_strategy: strategy,
            retry_delay_seconds,
            max_retries,
            fallback_available: self.fallbacks.is_available(service, operation),
            user_message,
            suggested_actions,
            context: context.clone(),
            stack_trace: self
                .capture_stack_traces
                .then(|| format!("{:?}", backtrace::Backtrace::new())),
            pattern: classification.pattern.map(|p| p.name.clone()),
        }
    }
}

fn to_owned_actions(actions: &[&str]) -> Vec<String> {
    actions.iter().map(|a| a.to_string()).collect()
}

/// Log a response at a level derived from its severity
pub fn log_response(response: &ErrorResponse) {
    match response.severity {
        ErrorSeverity::Critical => {
            tracing::error!(
                fatal = true,
                error_id = %response.error_id,
                service = %response.service,
                operation = %response.operation,
                category = ?response.category,
                strategy = ?response.retry_strategy,
                suggested_actions = ?response.suggested_actions,
                "Critical error occurred: {}",
                response.message
            );
        }
        ErrorSeverity::High => {
            tracing::error!(
                error_id = %response.error_id,
                service = %response.service,
                operation = %response.operation,
                category = ?response.category,
                strategy = ?response.retry_strategy,
                "Error occurred: {}",
                response.message
            );
        }
        ErrorSeverity::Medium => {
            tracing::warn!(
                error_id = %response.error_id,
                service = %response.service,
                operation = %response.operation,
                category = ?response.category,
                strategy = ?response.retry_strategy,
                "Warning: {}",
                response.message
            );
        }
        ErrorSeverity::Low => {
            tracing::info!(
                error_id = %response.error_id,
                service = %response.service,
                operation = %response.operation,
                category = ?response.category,
                "Info: {}",
                response.message
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_recovery::patterns::PatternRegistry;

    fn builder() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(
            ErrorClassifier::new(Arc::new(PatternRegistry::default())),
            Arc::new(FallbackRegistry::default()),
            false,
        )
    }

    #[test]
    fn test_error_id_format() {
        let response = builder().build(
            &OutreachError::timeout("Connection timeout"),
            "scraper",
            "fetch_page",
            &HashMap::new(),
        );
        let expected = format!("scraper_fetch_page_{}", response.timestamp.timestamp());
        assert_eq!(response.error_id, expected);
        assert_eq!(response.breaker_key(), "scraper.fetch_page");
        assert_eq!(response.pattern.as_deref(), Some("connection_timeout"));
    }

    #[test]
    fn test_retryable_strategies_set_should_retry() {
        let response = builder().build(
            &OutreachError::rate_limit("Rate limit exceeded - 429"),
            "ai_parser",
            "parse_company_info",
            &HashMap::new(),
        );
        assert!(response.should_retry);
        assert_eq!(response.retry_strategy, RecoveryStrategy::RetryAfterDelay);
        assert_eq!(response.max_retries, 5);
        assert!(response.fallback_available);
    }

    #[test]
    fn test_terminal_kind_never_retries() {
        let response = builder().build(
            &OutreachError::interrupted("received SIGINT"),
            "pipeline",
            "run",
            &HashMap::new(),
        );
        assert!(response.pattern.is_none());
        assert!(!response.should_retry);
        assert_eq!(response.retry_strategy, RecoveryStrategy::FailFast);
    }

    #[test]
    fn test_unmatched_failure_uses_category_guidance() {
        let response = builder().build(
            &OutreachError::other("request forbidden by upstream"),
            "email_sender",
            "send",
            &HashMap::new(),
        );
        assert_eq!(response.category, ErrorCategory::Authentication);
        assert_eq!(response.severity, ErrorSeverity::Critical);
        assert!(response
            .suggested_actions
            .iter()
            .any(|a| a.contains("credentials")));
        assert!(!response.fallback_available);
        // Credential failures wait for a person even without a pattern
        assert_eq!(response.retry_strategy, RecoveryStrategy::UserIntervention);
        assert!(!response.should_retry);
        assert_eq!(response.pattern, None);
    }

    #[test]
    fn test_pattern_without_text_falls_back_to_guidance() {
        let response = builder().build(
            &OutreachError::scraping("element not found: .team-member"),
            "scraper",
            "extract_people",
            &HashMap::new(),
        );
        assert_eq!(response.category, ErrorCategory::Scraping);
        assert_eq!(
            response.user_message,
            ErrorCategory::Scraping.guidance().user_message
        );
    }

    #[test]
    fn test_technical_details_and_context() {
        let mut context = HashMap::new();
        context.insert("company".to_string(), serde_json::json!("Acme"));
        let response = builder().build(
            &OutreachError::ai_provider_status("model overloaded", 503, None),
            "ai_parser",
            "extract_people",
            &context,
        );
        assert_eq!(response.message, "model overloaded");
        assert_eq!(response.technical_details.kind, "ai_provider_error");
        assert_eq!(
            response.technical_details.message,
            "AI provider error: model overloaded"
        );
        assert_eq!(response.technical_details.status_code, Some(503));
        assert_eq!(response.context["company"], "Acme");

        let api = response.to_api_value(true);
        assert_eq!(api["error"]["technical_details"]["status_code"], 503);
        assert_eq!(api["error"]["context"]["company"], "Acme");
        let api = response.to_api_value(false);
        assert!(api["error"].get("technical_details").is_none());
    }

    #[test]
    fn test_stack_trace_capture_toggle() {
        let builder = ErrorResponseBuilder::new(
            ErrorClassifier::new(Arc::new(PatternRegistry::default())),
            Arc::new(FallbackRegistry::empty()),
            true,
        );
        let response = builder.build(
            &OutreachError::storage("write conflict"),
            "storage",
            "save_company",
            &HashMap::new(),
        );
        assert!(response.stack_trace.is_some());
    }

    #[test]
    fn test_response_serializes() {
        let response = builder().build(
            &OutreachError::validation("invalid email format"),
            "email_finder",
            "find_email",
            &HashMap::new(),
        );
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["category"], "DATA_VALIDATION");
        assert_eq!(value["retry_strategy"], "SKIP_AND_CONTINUE");
        assert_eq!(value["severity"], "LOW");
    }
}
