use std::sync::{Arc, Mutex};

use crate::domain::clock::clock::SystemClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub open_timeout_ms: i64,
    pub success_threshold: u32,
    pub reset_on_success: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig { enabled: true, failure_threshold: 5, open_timeout_ms: 30_000, success_threshold: 2, reset_on_success: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitBreakerEvent {
    StateChange { from: CircuitState, to: CircuitState },
    RequestAllowed,
    RequestRejected,
    FailureRecorded,
    SuccessRecorded,
}

pub type EventListener = dyn Fn(&CircuitBreakerEvent) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u64,
    pub opened_at_ms: Option<i64>,
    pub half_opened_at_ms: Option<i64>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    total_requests: u64,
    opened_at_ms: Option<i64>,
    half_opened_at_ms: Option<i64>,
}

/// CLOSED/OPEN/HALF_OPEN state machine gating retry admission.
///
/// Shared behind an `Arc` between the retry engine and the state machine;
/// all mutation happens under one mutex, transitions are driven lazily by
/// the injected clock when admission is requested.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn SystemClock>,
    inner: Mutex<Inner>,
    listener: Mutex<Option<Arc<EventListener>>>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker").field("config", &self.config).field("state", &self.state()).finish()
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn SystemClock>) -> CircuitBreaker {
        CircuitBreaker {
            config,
            clock,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                total_requests: 0,
                opened_at_ms: None,
                half_opened_at_ms: None,
            }),
            listener: Mutex::new(None),
        }
    }

    pub fn set_listener(&self, listener: Arc<EventListener>) {
        *self.listener.lock().unwrap() = Some(listener);
    }

    fn emit(&self, event: CircuitBreakerEvent) {
        // Clone out of the lock so a listener may query the breaker.
        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener(&event);
        }
    }

    /// Asks for admission of one request. `false` means the caller must
    /// fail fast with `CircuitOpen`.
    pub fn try_admit(&self) -> bool {
        if !self.config.enabled {
            return true;
        }

        let now = self.clock.now_ms();
        let (admitted, transition) = {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                CircuitState::Closed => {
                    inner.total_requests += 1;
                    (true, None)
                }
                CircuitState::Open => {
                    let opened_at = inner.opened_at_ms.unwrap_or(now);
                    if now - opened_at >= self.config.open_timeout_ms {
                        inner.state = CircuitState::HalfOpen;
                        inner.half_opened_at_ms = Some(now);
                        inner.success_count = 0;
                        inner.total_requests += 1;
                        (true, Some((CircuitState::Open, CircuitState::HalfOpen)))
                    } else {
                        (false, None)
                    }
                }
                CircuitState::HalfOpen => {
                    inner.total_requests += 1;
                    (true, None)
                }
            }
        };

        if let Some((from, to)) = transition {
            log::info!("Circuit breaker transitions {} -> {} after open timeout.", from, to);
            self.emit(CircuitBreakerEvent::StateChange { from, to });
        }

        if admitted {
            self.emit(CircuitBreakerEvent::RequestAllowed);
        } else {
            self.emit(CircuitBreakerEvent::RequestRejected);
        }

        admitted
    }

    pub fn record_success(&self) {
        if !self.config.enabled {
            return;
        }

        let transition = {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                CircuitState::Closed => {
                    if self.config.reset_on_success {
                        inner.failure_count = 0;
                    }
                    None
                }
                CircuitState::HalfOpen => {
                    inner.success_count += 1;
                    if inner.success_count >= self.config.success_threshold {
                        inner.state = CircuitState::Closed;
                        inner.failure_count = 0;
                        inner.success_count = 0;
                        inner.opened_at_ms = None;
                        inner.half_opened_at_ms = None;
                        Some((CircuitState::HalfOpen, CircuitState::Closed))
                    } else {
                        None
                    }
                }
                CircuitState::Open => None,
            }
        };

        self.emit(CircuitBreakerEvent::SuccessRecorded);
        if let Some((from, to)) = transition {
            log::info!("Circuit breaker transitions {} -> {} after {} probe success(es).", from, to, self.config.success_threshold);
            self.emit(CircuitBreakerEvent::StateChange { from, to });
        }
    }

    pub fn record_failure(&self) {
        if !self.config.enabled {
            return;
        }

        let now = self.clock.now_ms();
        let transition = {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                CircuitState::Closed => {
                    inner.failure_count += 1;
                    if inner.failure_count >= self.config.failure_threshold {
                        inner.state = CircuitState::Open;
                        inner.opened_at_ms = Some(now);
                        Some((CircuitState::Closed, CircuitState::Open))
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    inner.state = CircuitState::Open;
                    inner.opened_at_ms = Some(now);
                    inner.success_count = 0;
                    Some((CircuitState::HalfOpen, CircuitState::Open))
                }
                CircuitState::Open => None,
            }
        };

        self.emit(CircuitBreakerEvent::FailureRecorded);
        if let Some((from, to)) = transition {
            log::warn!("Circuit breaker transitions {} -> {}.", from, to);
            self.emit(CircuitBreakerEvent::StateChange { from, to });
        }
    }

    pub fn reset(&self) {
        let from = {
            let mut inner = self.inner.lock().unwrap();
            let from = inner.state;
            inner.state = CircuitState::Closed;
            inner.failure_count = 0;
            inner.success_count = 0;
            inner.opened_at_ms = None;
            inner.half_opened_at_ms = None;
            from
        };

        if from != CircuitState::Closed {
            self.emit(CircuitBreakerEvent::StateChange { from, to: CircuitState::Closed });
        }
    }

    pub fn force_open(&self) {
        let now = self.clock.now_ms();
        let from = {
            let mut inner = self.inner.lock().unwrap();
            let from = inner.state;
            inner.state = CircuitState::Open;
            inner.opened_at_ms = Some(now);
            from
        };

        if from != CircuitState::Open {
            self.emit(CircuitBreakerEvent::StateChange { from, to: CircuitState::Open });
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.inner.lock().unwrap();
        CircuitBreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_requests: inner.total_requests,
            opened_at_ms: inner.opened_at_ms,
            half_opened_at_ms: inner.half_opened_at_ms,
        }
    }
}
