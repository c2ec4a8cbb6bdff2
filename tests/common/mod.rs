//! Shared fixtures for the integration tests

#![allow(dead_code)]

use outreach_resilience::{EngineConfig, OutreachError, RecoveryEngine};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Engine with default policy and stack trace capture disabled
pub fn quiet_engine() -> RecoveryEngine {
    RecoveryEngine::with_config(quiet_config())
}

pub fn quiet_config() -> EngineConfig {
    EngineConfig {
        capture_stack_traces: false,
        ..Default::default()
    }
}

/// Work that fails `failures` times with `error()` and then yields `value`.
///
/// The returned counter records every invocation.
pub fn flaky<T, F>(
    failures: u32,
    error: F,
    value: T,
) -> (
    Arc<AtomicU32>,
    impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<T, OutreachError>> + Send>>,
)
where
    T: Clone + Send + 'static,
    F: Fn() -> OutreachError + Clone + Send + 'static,
{
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let work = move || {
        let counter = counter.clone();
        let error = error.clone();
        let value = value.clone();
        Box::pin(async move {
            let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= failures {
                Err(error())
            } else {
                Ok(value)
            }
        }) as std::pin::Pin<Box<dyn Future<Output = Result<T, OutreachError>> + Send>>
    };
    (calls, work)
}

/// Work that always fails with `error()`
pub fn always_failing<F>(
    error: F,
) -> (
    Arc<AtomicU32>,
    impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<(), OutreachError>> + Send>>,
)
where
    F: Fn() -> OutreachError + Clone + Send + 'static,
{
    flaky(u32::MAX, error, ())
}

pub fn calls(counter: &Arc<AtomicU32>) -> u32 {
    counter.load(Ordering::SeqCst)
}
