//! In-process error statistics
//!
//! A bounded log of handled failures supports windowed reports; plain
//! counters track what the engine did with them.

use crate::error_recovery::circuit_breaker::CircuitBreakerStats;
use crate::error_recovery::patterns::{ErrorCategory, ErrorSeverity};
use crate::error_recovery::response::ErrorResponse;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// One handled failure as retained for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error_id: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub operation: String,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
}

impl From<&ErrorResponse> for ErrorRecord {
    fn from(response: &ErrorResponse) -> Self {
        Self {
            error_id: response.error_id.clone(),
            timestamp: response.timestamp,
            service: response.service.clone(),
            operation: response.operation.clone(),
            category: response.category,
            severity: response.severity,
        }
    }
}

/// Engine activity counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineCounters {
    pub total_executions: u64,
    pub successful_first_attempt: u64,
    pub successful_after_retry: u64,
    pub total_retry_attempts: u64,
    pub fallbacks_used: u64,
    pub skipped_operations: u64,
    pub circuit_rejections: u64,
    pub terminal_failures: u64,
}

/// Windowed error report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorStatistics {
    pub window_hours: u32,
    pub total_errors: usize,
    pub by_category: HashMap<ErrorCategory, usize>,
    pub by_service: HashMap<String, usize>,
    pub by_severity: HashMap<ErrorSeverity, usize>,
    pub circuit_breakers: HashMap<String, CircuitBreakerStats>,
    pub counters: EngineCounters,
}

/// Bounded error log in insertion order plus counters
#[derive(Debug)]
pub struct ErrorLog {
    capacity: usize,
    records: VecDeque<ErrorRecord>,
    pub(crate) counters: EngineCounters,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: VecDeque::new(),
            counters: EngineCounters::default(),
        }
    }

    /// Append a record, evicting the oldest when full
    pub fn push(&mut self, record: ErrorRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    /// Drop records and counters
    pub fn clear(&mut self) {
        self.records.clear();
        self.counters = EngineCounters::default();
    }

    /// Report over records newer than `now - window_hours`
    pub fn summarize(
        &self,
        window_hours: u32,
        now: DateTime<Utc>,
        circuit_breakers: HashMap<String, CircuitBreakerStats>,
    ) -> ErrorStatistics {
        let cutoff = now - Duration::hours(i64::from(window_hours));

        let mut by_category = HashMap::new();
        let mut by_service = HashMap::new();
        let mut by_severity = HashMap::new();
        let mut total_errors = 0;

        // Wall-clock steps can leave records out of order, so check each one
        for record in self.records.iter().filter(|r| r.timestamp >= cutoff) {
            total_errors += 1;
            *by_category.entry(record.category).or_insert(0) += 1;
            *by_service.entry(record.service.clone()).or_insert(0) += 1;
            *by_severity.entry(record.severity).or_insert(0) += 1;
        }

        ErrorStatistics {
            window_hours,
            total_errors,
            by_category,
            by_service,
            by_severity,
            circuit_breakers,
            counters: self.counters.clone(),
        }
    }
}
