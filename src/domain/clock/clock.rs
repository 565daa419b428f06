use chrono::Utc;

/// Source of the current wall-clock time in milliseconds since the epoch.
///
/// Every time-dependent component (circuit breaker timers, cache TTLs,
/// pattern timestamps) reads time through this trait so tests can inject
/// a controllable clock instead of the real one.
pub trait SystemClock: std::fmt::Debug + Send + Sync {
    fn now_ms(&self) -> i64;
    fn clone_box(&self) -> Box<dyn SystemClock>;
}

impl Clone for Box<dyn SystemClock> {
    fn clone(&self) -> Box<dyn SystemClock> {
        self.clone_box()
    }
}

#[derive(Debug, Clone)]
pub struct WallClock;

impl SystemClock for WallClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn clone_box(&self) -> Box<dyn SystemClock> {
        Box::new(self.clone())
    }
}

impl WallClock {
    pub fn new() -> WallClock {
        WallClock
    }
}

impl Default for WallClock {
    fn default() -> Self {
        WallClock::new()
    }
}
