use crate::domain::clock::clock::SystemClock;

use std::sync::{Arc, RwLock};

/// Settable clock shared between a test and the components under test.
#[derive(Debug, Clone)]
pub struct MockClock {
    pub time_ms: Arc<RwLock<i64>>,
}

impl MockClock {
    pub fn new(time_ms: i64) -> MockClock {
        MockClock { time_ms: Arc::new(RwLock::new(time_ms)) }
    }

    pub fn set(&self, time_ms: i64) {
        *self.time_ms.write().unwrap() = time_ms;
    }

    pub fn advance(&self, delta_ms: i64) {
        *self.time_ms.write().unwrap() += delta_ms;
    }
}

impl SystemClock for MockClock {
    fn now_ms(&self) -> i64 {
        *self.time_ms.read().unwrap()
    }

    fn clone_box(&self) -> Box<dyn SystemClock> {
        Box::new(self.clone())
    }
}
