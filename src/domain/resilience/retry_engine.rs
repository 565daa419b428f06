use rand::Rng;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

use crate::domain::clock::clock::SystemClock;
use crate::domain::resilience::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::domain::resilience::error_classifier::{self, ErrorCategory};
use crate::error::{Error, Result};

/// Lower bound no jittered delay may undershoot.
pub const MIN_DELAY_MS: u64 = 100;

/// Operator-facing backoff knobs shared by all retry policies.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig { max_attempts: 3, initial_delay_ms: 1_000, max_delay_ms: 15_000, backoff_multiplier: 2.0, jitter_ratio: 0.25 }
    }
}

/// A policy is the base config plus the error categories one booking step
/// is willing to retry on.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_ratio: f64,
    pub retry_on: Vec<ErrorCategory>,
}

impl RetryPolicy {
    fn from_config(config: &RetryConfig, retry_on: Vec<ErrorCategory>) -> RetryPolicy {
        RetryPolicy {
            max_attempts: config.max_attempts,
            initial_delay_ms: config.initial_delay_ms,
            max_delay_ms: config.max_delay_ms,
            backoff_multiplier: config.backoff_multiplier,
            jitter_ratio: config.jitter_ratio,
            retry_on,
        }
    }

    /// Navigation is dominated by transport faults.
    pub fn navigation(config: &RetryConfig) -> RetryPolicy {
        RetryPolicy::from_config(
            config,
            vec![ErrorCategory::Network, ErrorCategory::Timeout, ErrorCategory::ServerError, ErrorCategory::RateLimit],
        )
    }

    /// Calendar search waits on slow renders.
    pub fn search(config: &RetryConfig) -> RetryPolicy {
        RetryPolicy::from_config(config, vec![ErrorCategory::Timeout, ErrorCategory::Network, ErrorCategory::ElementNotFound])
    }

    /// Slot actions mostly lose races against element re-renders.
    pub fn action(config: &RetryConfig) -> RetryPolicy {
        RetryPolicy::from_config(config, vec![ErrorCategory::ElementNotFound, ErrorCategory::Timeout, ErrorCategory::Network])
    }

    /// Confirmation talks to the booking backend, which throttles.
    pub fn confirmation(config: &RetryConfig) -> RetryPolicy {
        RetryPolicy::from_config(
            config,
            vec![ErrorCategory::RateLimit, ErrorCategory::ServerError, ErrorCategory::Network, ErrorCategory::Timeout],
        )
    }
}

#[derive(Debug, Clone)]
pub struct RetryContext {
    pub operation: String,
    pub policy: RetryPolicy,
}

impl RetryContext {
    pub fn new(operation: impl Into<String>, policy: RetryPolicy) -> RetryContext {
        RetryContext { operation: operation.into(), policy }
    }
}

/// One failed attempt, kept for the user-visible booking result.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptDetail {
    pub attempt: u32,
    pub category: String,
    pub message: String,
    pub delay_ms: u64,
}

#[derive(Debug)]
pub struct RetryResult<T> {
    pub outcome: Result<T>,
    pub attempts: u32,
    pub total_duration_ms: u64,
    pub details: Vec<AttemptDetail>,
    pub circuit_breaker_tripped: bool,
}

/// `min(initial × multiplier^(attempt−1), max)`, scaled by the category
/// multiplier, with symmetric jitter, clamped to `[MIN_DELAY_MS, max]`.
pub fn compute_delay(policy: &RetryPolicy, attempt: u32, category: ErrorCategory) -> u64 {
    let exponential = policy.initial_delay_ms as f64 * policy.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
    let base = exponential.min(policy.max_delay_ms as f64);
    let adjusted = base * category.delay_multiplier();

    let jitter_span = policy.jitter_ratio * adjusted;
    let jitter = if jitter_span > 0.0 { rand::rng().random_range(-jitter_span..=jitter_span) } else { 0.0 };

    (adjusted + jitter).clamp(MIN_DELAY_MS as f64, policy.max_delay_ms as f64) as u64
}

/// Runs operations through classification-aware retry with exponential
/// backoff, gated by the shared circuit breaker.
#[derive(Debug)]
pub struct RetryEngine {
    breaker: Arc<CircuitBreaker>,
    clock: Arc<dyn SystemClock>,
    cancel: CancellationToken,
}

impl RetryEngine {
    pub fn new(breaker: Arc<CircuitBreaker>, clock: Arc<dyn SystemClock>) -> RetryEngine {
        RetryEngine { breaker, clock, cancel: CancellationToken::new() }
    }

    /// Token that aborts in-flight retry loops; observed between attempts
    /// and during backoff sleeps.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub async fn execute<T, F, Fut>(&self, context: &RetryContext, mut operation: F) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = self.clock.now_ms();
        let mut details: Vec<AttemptDetail> = Vec::new();
        let mut attempts = 0;

        loop {
            if self.cancel.is_cancelled() {
                return self.finish(Err(Error::Cancelled), attempts, started, details);
            }

            if !self.breaker.try_admit() {
                log::warn!("Operation '{}' rejected by the circuit breaker.", context.operation);
                return self.finish(Err(Error::CircuitOpen), attempts, started, details);
            }

            attempts += 1;
            match operation().await {
                Ok(value) => {
                    self.breaker.record_success();
                    return self.finish(Ok(value), attempts, started, details);
                }
                Err(error) => {
                    let category = error_classifier::classify(&error);

                    if let Some(category) = category {
                        if category.counts_toward_breaker() {
                            self.breaker.record_failure();
                        }
                    }

                    let retryable = category.map(|c| context.policy.retry_on.contains(&c)).unwrap_or(false);
                    let exhausted = attempts >= context.policy.max_attempts;
                    let delay_ms = match category {
                        Some(category) if retryable && !exhausted => compute_delay(&context.policy, attempts, category),
                        _ => 0,
                    };

                    details.push(AttemptDetail {
                        attempt: attempts,
                        category: category.map(|c| c.as_str().to_string()).unwrap_or_else(|| "terminal".to_string()),
                        message: error.to_string(),
                        delay_ms,
                    });

                    if !retryable || exhausted {
                        log::error!(
                            "Operation '{}' failed after {} attempt(s) ({}): {}",
                            context.operation,
                            attempts,
                            category.map(|c| c.as_str()).unwrap_or("terminal"),
                            error
                        );
                        return self.finish(Err(error), attempts, started, details);
                    }

                    log::warn!(
                        "Operation '{}' attempt {}/{} failed ({}): {}. Retrying in {} ms.",
                        context.operation,
                        attempts,
                        context.policy.max_attempts,
                        category.map(|c| c.as_str()).unwrap_or("terminal"),
                        error,
                        delay_ms
                    );

                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return self.finish(Err(Error::Cancelled), attempts, started, details);
                        }
                        _ = sleep(Duration::from_millis(delay_ms)) => {}
                    }
                }
            }
        }
    }

    fn finish<T>(&self, outcome: Result<T>, attempts: u32, started_ms: i64, details: Vec<AttemptDetail>) -> RetryResult<T> {
        let circuit_breaker_tripped = matches!(outcome, Err(Error::CircuitOpen)) || self.breaker.state() == CircuitState::Open;
        RetryResult { outcome, attempts, total_duration_ms: (self.clock.now_ms() - started_ms).max(0) as u64, details, circuit_breaker_tripped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::clock_mock::MockClock;
    use crate::domain::resilience::circuit_breaker::CircuitBreakerConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn engine(clock: &MockClock) -> RetryEngine {
        let breaker = CircuitBreaker::new(
            CircuitBreakerConfig { enabled: true, failure_threshold: 3, open_timeout_ms: 10_000, success_threshold: 2, reset_on_success: true },
            Arc::new(clock.clone()),
        );
        RetryEngine::new(Arc::new(breaker), Arc::new(clock.clone()))
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy::navigation(&RetryConfig { max_attempts: 3, initial_delay_ms: 100, max_delay_ms: 500, backoff_multiplier: 2.0, jitter_ratio: 0.0 })
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let clock = MockClock::new(0);
        let engine = engine(&clock);
        let context = RetryContext::new("navigate", quick_policy());

        let result = engine.execute(&context, || async { Ok::<_, Error>(42) }).await;
        assert_eq!(result.outcome.unwrap(), 42);
        assert_eq!(result.attempts, 1);
        assert!(result.details.is_empty());
        assert!(!result.circuit_breaker_tripped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_network_errors() {
        let clock = MockClock::new(0);
        let engine = engine(&clock);
        let context = RetryContext::new("navigate", quick_policy());
        let calls = AtomicU32::new(0);

        let result = engine
            .execute(&context, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n == 0 { Err(Error::Network("connection reset".to_string())) } else { Ok(7) } }
            })
            .await;

        assert_eq!(result.outcome.unwrap(), 7);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.details.len(), 1);
        assert_eq!(result.details[0].category, "network");
        assert!(result.details[0].delay_ms >= MIN_DELAY_MS);
    }

    #[tokio::test]
    async fn test_terminal_errors_are_not_retried() {
        let clock = MockClock::new(0);
        let engine = engine(&clock);
        let context = RetryContext::new("validate", quick_policy());
        let calls = AtomicU32::new(0);

        let result = engine
            .execute(&context, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, _>(Error::ValidationError("bad date".to_string())) }
            })
            .await;

        assert!(result.outcome.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.details[0].category, "terminal");
    }

    #[tokio::test]
    async fn test_category_outside_policy_is_not_retried() {
        let clock = MockClock::new(0);
        let engine = engine(&clock);
        // Navigation policy does not retry element lookups.
        let context = RetryContext::new("navigate", quick_policy());

        let result = engine.execute(&context, || async { Err::<u32, _>(Error::element_not_found("slot", "gone")) }).await;
        assert_eq!(result.attempts, 1);
        assert!(matches!(result.outcome, Err(Error::ElementNotFound { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_fails_fast_without_invoking_the_operation() {
        let clock = MockClock::new(0);
        let engine = engine(&clock);
        let context = RetryContext::new("navigate", quick_policy());

        engine.breaker().force_open();
        let calls = AtomicU32::new(0);
        let result = engine
            .execute(&context, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, Error>(1) }
            })
            .await;

        assert!(matches!(result.outcome, Err(Error::CircuitOpen)));
        assert!(result.circuit_breaker_tripped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_the_last_error_with_details() {
        let clock = MockClock::new(0);
        let engine = engine(&clock);
        let context = RetryContext::new("navigate", quick_policy());

        let result = engine.execute(&context, || async { Err::<u32, _>(Error::Timeout("navigation timed out".to_string())) }).await;
        assert_eq!(result.attempts, 3);
        assert_eq!(result.details.len(), 3);
        assert!(matches!(result.outcome, Err(Error::Timeout(_))));
        // Three timeouts reached the failure threshold.
        assert!(result.circuit_breaker_tripped);
    }

    #[tokio::test]
    async fn test_cancellation_is_terminal() {
        let clock = MockClock::new(0);
        let engine = engine(&clock);
        let context = RetryContext::new("navigate", quick_policy());

        engine.cancellation_token().cancel();
        let result = engine.execute(&context, || async { Ok::<_, Error>(1) }).await;
        assert!(matches!(result.outcome, Err(Error::Cancelled)));
        assert_eq!(result.attempts, 0);
    }

    #[test]
    fn test_delay_respects_floor_cap_and_category_multiplier() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 40,
            max_delay_ms: 2_000,
            backoff_multiplier: 2.0,
            jitter_ratio: 0.5,
            retry_on: vec![],
        };

        for attempt in 1..=8 {
            for category in [ErrorCategory::Network, ErrorCategory::RateLimit, ErrorCategory::ElementNotFound] {
                let delay = compute_delay(&policy, attempt, category);
                assert!(delay >= MIN_DELAY_MS, "delay {} under floor", delay);
                assert!(delay <= policy.max_delay_ms, "delay {} over cap", delay);
            }
        }

        // Rate limit waits longer than element-not-found at the same attempt.
        let no_jitter = RetryPolicy { jitter_ratio: 0.0, ..policy };
        assert!(compute_delay(&no_jitter, 3, ErrorCategory::RateLimit) > compute_delay(&no_jitter, 3, ErrorCategory::ElementNotFound));
    }
}
