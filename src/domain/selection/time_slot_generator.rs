use serde::Deserialize;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, RwLock};

use crate::domain::clock::clock::SystemClock;
use crate::domain::datetime::date_time_calculator::DateTimeCalculator;
use crate::domain::datetime::time_format;
use crate::error::{Error, Result};

const PEAK_START_MINUTES: i32 = 17 * 60;
const PEAK_END_MINUTES: i32 = 20 * 60;
const PEAK_PENALTY: i32 = 5;

/// Operator preference boosting slots around a favorite start time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePreference {
    pub start_time: String,
    pub priority: u8,
    #[serde(alias = "flexibility")]
    pub flexibility_minutes: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackStrategy {
    Gradual,
    PeakAvoidance,
    BusinessHours,
}

impl FallbackStrategy {
    pub fn from_name(name: &str) -> Result<FallbackStrategy> {
        match name {
            "gradual" => Ok(FallbackStrategy::Gradual),
            "peak-avoidance" => Ok(FallbackStrategy::PeakAvoidance),
            "business-hours" => Ok(FallbackStrategy::BusinessHours),
            other => Err(Error::InvalidConfig(format!("Unknown fallback strategy '{}'.", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackStrategy::Gradual => "gradual",
            FallbackStrategy::PeakAvoidance => "peak-avoidance",
            FallbackStrategy::BusinessHours => "business-hours",
        }
    }
}

/// One fallback candidate with its computed priority.
#[derive(Debug, Clone, PartialEq)]
pub struct PrioritizedSlot {
    pub start_time: String,
    pub priority: i32,
    pub distance_minutes: i32,
}

#[derive(Debug)]
struct CachedGeneration {
    slots: Vec<PrioritizedSlot>,
    last_used_ms: i64,
}

/// Generates the priority-ordered fallback times around a target.
///
/// Results are cached by (target, preferences, range, step, strategy);
/// within one run the same question is asked for every retry attempt.
pub struct TimeSlotGenerator {
    calculator: Arc<DateTimeCalculator>,
    business_open: String,
    business_close: String,
    clock: Arc<dyn SystemClock>,
    cache: RwLock<HashMap<u64, CachedGeneration>>,
    cache_max: usize,
    cache_ttl_ms: i64,
}

impl std::fmt::Debug for TimeSlotGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeSlotGenerator").field("business_open", &self.business_open).field("business_close", &self.business_close).finish()
    }
}

impl TimeSlotGenerator {
    pub fn new(calculator: Arc<DateTimeCalculator>, clock: Arc<dyn SystemClock>) -> TimeSlotGenerator {
        TimeSlotGenerator {
            calculator,
            business_open: "08:00".to_string(),
            business_close: "22:00".to_string(),
            clock,
            cache: RwLock::new(HashMap::new()),
            cache_max: 32,
            cache_ttl_ms: 5 * 60 * 1_000,
        }
    }

    pub fn with_business_hours(mut self, open: &str, close: &str) -> TimeSlotGenerator {
        self.business_open = open.to_string();
        self.business_close = close.to_string();
        self
    }

    pub fn generate(
        &self,
        target: &str,
        preferences: &[TimePreference],
        range_minutes: i32,
        step_minutes: i32,
        strategy: FallbackStrategy,
    ) -> Result<Vec<PrioritizedSlot>> {
        let key = cache_key(target, preferences, range_minutes, step_minutes, strategy);
        let now = self.clock.now_ms();

        if let Some(cached) = self.cache_lookup(key, now) {
            return Ok(cached);
        }

        let target_minutes = time_format::minutes_of_day(target)?;
        let open_minutes = time_format::minutes_of_day(&self.business_open)?;
        let close_minutes = time_format::minutes_of_day(&self.business_close)?;

        let base = self.calculator.generate_alternative_time_slots(target, range_minutes, step_minutes)?;

        let mut slots: Vec<PrioritizedSlot> = Vec::with_capacity(base.len());
        for start_time in base {
            let minutes = time_format::minutes_of_day(&start_time)?;

            if strategy == FallbackStrategy::BusinessHours && !(open_minutes..=close_minutes).contains(&minutes) {
                continue;
            }

            let mut priority = 0;
            for preference in preferences {
                let preference_minutes = time_format::minutes_of_day(&preference.start_time)?;
                if (minutes - preference_minutes).abs() <= preference.flexibility_minutes {
                    priority += preference.priority as i32;
                }
            }

            if strategy == FallbackStrategy::PeakAvoidance && (PEAK_START_MINUTES..PEAK_END_MINUTES).contains(&minutes) {
                priority -= PEAK_PENALTY;
            }

            slots.push(PrioritizedSlot { start_time, priority, distance_minutes: minutes - target_minutes });
        }

        slots.sort_by_key(|slot| (-slot.priority, slot.distance_minutes.abs(), slot.start_time.clone()));

        self.cache_store(key, &slots, now);
        Ok(slots)
    }

    fn cache_lookup(&self, key: u64, now: i64) -> Option<Vec<PrioritizedSlot>> {
        let mut cache = self.cache.write().unwrap();
        if let Some(entry) = cache.get_mut(&key) {
            if now - entry.last_used_ms <= self.cache_ttl_ms {
                entry.last_used_ms = now;
                return Some(entry.slots.clone());
            }
            cache.remove(&key);
        }
        None
    }

    fn cache_store(&self, key: u64, slots: &[PrioritizedSlot], now: i64) {
        let mut cache = self.cache.write().unwrap();
        if cache.len() >= self.cache_max {
            if let Some(oldest) = cache.iter().min_by_key(|(_, entry)| entry.last_used_ms).map(|(k, _)| *k) {
                cache.remove(&oldest);
            }
        }
        cache.insert(key, CachedGeneration { slots: slots.to_vec(), last_used_ms: now });
    }
}

fn cache_key(target: &str, preferences: &[TimePreference], range_minutes: i32, step_minutes: i32, strategy: FallbackStrategy) -> u64 {
    let mut hasher = DefaultHasher::new();
    target.hash(&mut hasher);
    for preference in preferences {
        preference.start_time.hash(&mut hasher);
        preference.priority.hash(&mut hasher);
        preference.flexibility_minutes.hash(&mut hasher);
    }
    range_minutes.hash(&mut hasher);
    step_minutes.hash(&mut hasher);
    strategy.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::clock_mock::MockClock;

    fn generator() -> TimeSlotGenerator {
        let clock: Arc<MockClock> = Arc::new(MockClock::new(0));
        let calculator = Arc::new(DateTimeCalculator::new(chrono_tz::Europe::Berlin, clock.clone()));
        TimeSlotGenerator::new(calculator, clock)
    }

    #[test]
    fn test_gradual_orders_nearest_first_earlier_on_ties() {
        let generator = generator();
        let slots = generator.generate("14:00", &[], 60, 30, FallbackStrategy::Gradual).unwrap();
        let times: Vec<&str> = slots.iter().map(|s| s.start_time.as_str()).collect();
        assert_eq!(times, vec!["14:00", "13:30", "14:30", "13:00", "15:00"]);
    }

    #[test]
    fn test_preferences_boost_their_window() {
        let generator = generator();
        let preferences = vec![TimePreference { start_time: "15:00".to_string(), priority: 8, flexibility_minutes: 0 }];

        let slots = generator.generate("14:00", &preferences, 60, 30, FallbackStrategy::Gradual).unwrap();
        assert_eq!(slots[0].start_time, "15:00");
        assert_eq!(slots[0].priority, 8);
        assert_eq!(slots[1].start_time, "14:00");
    }

    #[test]
    fn test_peak_avoidance_deprioritizes_evening() {
        let generator = generator();
        let slots = generator.generate("17:00", &[], 60, 30, FallbackStrategy::PeakAvoidance).unwrap();
        // 16:30 and 16:00 are outside the 17:00-20:00 peak and move ahead.
        assert_eq!(slots[0].start_time, "16:30");
        assert_eq!(slots[1].start_time, "16:00");
        assert!(slots.iter().find(|s| s.start_time == "17:00").unwrap().priority < 0);
    }

    #[test]
    fn test_business_hours_clamp() {
        let generator = generator();
        let slots = generator.generate("08:00", &[], 120, 30, FallbackStrategy::BusinessHours).unwrap();
        assert!(slots.iter().all(|s| s.start_time.as_str() >= "08:00"));
        assert!(slots.iter().any(|s| s.start_time == "09:00"));
    }

    #[test]
    fn test_generation_is_cached() {
        let generator = generator();
        let first = generator.generate("14:00", &[], 60, 30, FallbackStrategy::Gradual).unwrap();
        let second = generator.generate("14:00", &[], 60, 30, FallbackStrategy::Gradual).unwrap();
        assert_eq!(first, second);
        assert_eq!(generator.cache.read().unwrap().len(), 1);

        generator.generate("15:00", &[], 60, 30, FallbackStrategy::Gradual).unwrap();
        assert_eq!(generator.cache.read().unwrap().len(), 2);
    }
}
