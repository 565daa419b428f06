use chrono::{DateTime, Datelike, Duration, NaiveDate, Weekday};
use chrono_tz::Tz;
use std::sync::Arc;

use crate::domain::clock::clock::SystemClock;
use crate::domain::datetime::time_format;
use crate::error::{Error, Result};

pub type HolidayOracle = dyn Fn(NaiveDate) -> bool + Send + Sync;

/// Pure date and time-slot computation over a configured timezone.
///
/// "Now" is read through the injected [`SystemClock`], so the calculator is
/// fully deterministic under test.
pub struct DateTimeCalculator {
    tz: Tz,
    clock: Arc<dyn SystemClock>,
    holiday_oracle: Option<Arc<HolidayOracle>>,
}

impl DateTimeCalculator {
    pub fn new(tz: Tz, clock: Arc<dyn SystemClock>) -> DateTimeCalculator {
        DateTimeCalculator { tz, clock, holiday_oracle: None }
    }

    /// Injects an oracle that reports public holidays. Without one, only
    /// weekends are treated as non-business days.
    pub fn with_holiday_oracle(mut self, oracle: Arc<HolidayOracle>) -> DateTimeCalculator {
        self.holiday_oracle = Some(oracle);
        self
    }

    /// The calendar date `days_ahead` days from today in the configured zone.
    ///
    /// Date arithmetic is done on the local calendar date, so crossing a DST
    /// boundary shifts by whole days and never by 23 or 25 hours.
    pub fn booking_date(&self, days_ahead: i64) -> NaiveDate {
        let now_utc = DateTime::from_timestamp_millis(self.clock.now_ms()).expect("clock produced an out-of-range timestamp");
        let today = now_utc.with_timezone(&self.tz).date_naive();
        today + Duration::days(days_ahead)
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        if let Some(oracle) = &self.holiday_oracle {
            if oracle(date) {
                return false;
            }
        }

        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Aligned `HH:MM` points covering `[start, start + duration)`.
    pub fn generate_time_slots(&self, start: &str, duration_minutes: i32, step_minutes: i32) -> Result<Vec<String>> {
        if step_minutes <= 0 || duration_minutes < 0 {
            return Err(Error::InvalidConfig(format!(
                "Time slot generation requires a positive step and non-negative duration, got step {} and duration {}.",
                step_minutes, duration_minutes
            )));
        }

        let start_minutes = time_format::minutes_of_day(start)?;
        let mut slots = Vec::new();

        let mut offset = 0;
        while offset < duration_minutes {
            let total = start_minutes + offset;
            if total >= 24 * 60 {
                break;
            }
            slots.push(time_format::from_minutes(total));
            offset += step_minutes;
        }

        Ok(slots)
    }

    /// Slots within `target ± range_minutes`, ordered by absolute distance
    /// from the target, earlier-before-later on equal distance.
    ///
    /// The target itself is the first element.
    pub fn generate_alternative_time_slots(&self, target: &str, range_minutes: i32, step_minutes: i32) -> Result<Vec<String>> {
        if step_minutes <= 0 || range_minutes < 0 {
            return Err(Error::InvalidConfig(format!(
                "Alternative slot generation requires a positive step and non-negative range, got step {} and range {}.",
                step_minutes, range_minutes
            )));
        }

        let target_minutes = time_format::minutes_of_day(target)?;
        let steps = range_minutes / step_minutes;

        let mut candidates: Vec<(i32, i32)> = Vec::new();
        for k in -steps..=steps {
            let total = target_minutes + k * step_minutes;
            if (0..24 * 60).contains(&total) {
                candidates.push(((k * step_minutes).abs(), total));
            }
        }

        candidates.sort();

        Ok(candidates.into_iter().map(|(_, total)| time_format::from_minutes(total)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::clock_mock::MockClock;
    use chrono::NaiveDate;

    fn calculator_at(tz: Tz, iso_utc: &str) -> DateTimeCalculator {
        let at = DateTime::parse_from_rfc3339(iso_utc).unwrap().timestamp_millis();
        DateTimeCalculator::new(tz, Arc::new(MockClock::new(at)))
    }

    #[test]
    fn test_booking_date_simple_offset() {
        let calc = calculator_at(chrono_tz::Europe::Berlin, "2025-11-03T10:00:00+00:00");
        assert_eq!(calc.booking_date(20), NaiveDate::from_ymd_opt(2025, 11, 23).unwrap());
    }

    #[test]
    fn test_booking_date_is_computed_in_the_target_zone() {
        // 23:30 UTC is already the next day in Berlin.
        let calc = calculator_at(chrono_tz::Europe::Berlin, "2025-11-03T23:30:00+00:00");
        assert_eq!(calc.booking_date(0), NaiveDate::from_ymd_opt(2025, 11, 4).unwrap());
    }

    #[test]
    fn test_booking_date_across_dst_forward_and_backward() {
        // Berlin enters DST on 2025-03-30 and leaves it on 2025-10-26.
        let spring = calculator_at(chrono_tz::Europe::Berlin, "2025-03-25T12:00:00+00:00");
        assert_eq!(spring.booking_date(7), NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());

        let autumn = calculator_at(chrono_tz::Europe::Berlin, "2025-10-22T12:00:00+00:00");
        assert_eq!(autumn.booking_date(7), NaiveDate::from_ymd_opt(2025, 10, 29).unwrap());
    }

    #[test]
    fn test_is_business_day_defaults_to_mon_fri() {
        let calc = calculator_at(chrono_tz::Europe::Berlin, "2025-11-03T10:00:00+00:00");
        assert!(calc.is_business_day(NaiveDate::from_ymd_opt(2025, 11, 3).unwrap())); // Monday
        assert!(!calc.is_business_day(NaiveDate::from_ymd_opt(2025, 11, 8).unwrap())); // Saturday
    }

    #[test]
    fn test_is_business_day_consults_the_holiday_oracle() {
        let christmas = NaiveDate::from_ymd_opt(2025, 12, 25).unwrap();
        let calc = calculator_at(chrono_tz::Europe::Berlin, "2025-11-03T10:00:00+00:00")
            .with_holiday_oracle(Arc::new(move |date: NaiveDate| date == christmas));

        assert!(!calc.is_business_day(christmas)); // Thursday, but a holiday
        assert!(calc.is_business_day(NaiveDate::from_ymd_opt(2025, 12, 23).unwrap()));
    }

    #[test]
    fn test_generate_time_slots_covers_the_duration() {
        let calc = calculator_at(chrono_tz::Europe::Berlin, "2025-11-03T10:00:00+00:00");
        let slots = calc.generate_time_slots("14:00", 60, 30).unwrap();
        assert_eq!(slots, vec!["14:00", "14:30"]);
    }

    #[test]
    fn test_generate_alternative_slots_ordering() {
        let calc = calculator_at(chrono_tz::Europe::Berlin, "2025-11-03T10:00:00+00:00");
        let slots = calc.generate_alternative_time_slots("14:00", 60, 30).unwrap();
        assert_eq!(slots, vec!["14:00", "13:30", "14:30", "13:00", "15:00"]);
    }

    #[test]
    fn test_generate_alternative_slots_clipped_at_midnight() {
        let calc = calculator_at(chrono_tz::Europe::Berlin, "2025-11-03T10:00:00+00:00");
        let slots = calc.generate_alternative_time_slots("23:30", 60, 30).unwrap();
        assert_eq!(slots, vec!["23:30", "23:00", "22:30"]);
    }

    #[test]
    fn test_invalid_target_time_is_rejected() {
        let calc = calculator_at(chrono_tz::Europe::Berlin, "2025-11-03T10:00:00+00:00");
        assert!(calc.generate_alternative_time_slots("25:00", 60, 30).is_err());
    }
}
