use crate::domain::calendar::calendar_matrix::CalendarMatrix;
use crate::domain::calendar::cell::{Slot, SlotPair};
use crate::domain::datetime::time_format;
use crate::domain::selection::court_scorer::{CourtScore, CourtScorer};
use crate::domain::selection::isolation_checker::{IsolationChecker, IsolationReport};
use crate::domain::selection::time_slot_generator::{FallbackStrategy, TimePreference, TimeSlotGenerator};
use crate::error::{Error, Result};

const PAIR_GAP_MINUTES: i32 = 30;

/// Candidate pair that was considered and turned down, kept for the run
/// report.
#[derive(Debug, Clone)]
pub struct RejectedCandidate {
    pub court_id: String,
    pub time_slot: String,
    pub reason: String,
    pub orphans: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PairSelection {
    pub pair: SlotPair,
    pub score: CourtScore,
    pub rejected: Vec<RejectedCandidate>,
}

/// Finds the best consecutive slot pair meeting every constraint:
/// prioritized fallback times, court scoring, and isolation avoidance.
///
/// All orderings are stable, so identical matrices produce identical
/// selections.
#[derive(Debug)]
pub struct SlotPairSelector {
    scorer: CourtScorer,
    generator: TimeSlotGenerator,
    isolation: IsolationChecker,
    preferences: Vec<TimePreference>,
    preferred_courts: Vec<String>,
    fallback_range_minutes: i32,
    strategy: FallbackStrategy,
}

impl SlotPairSelector {
    pub fn new(
        scorer: CourtScorer,
        generator: TimeSlotGenerator,
        preferences: Vec<TimePreference>,
        preferred_courts: Vec<String>,
        fallback_range_minutes: i32,
        strategy: FallbackStrategy,
    ) -> SlotPairSelector {
        SlotPairSelector {
            scorer,
            generator,
            isolation: IsolationChecker::new(PAIR_GAP_MINUTES),
            preferences,
            preferred_courts,
            fallback_range_minutes,
            strategy,
        }
    }

    pub fn select(&self, matrix: &CalendarMatrix, date: &str, target_time: &str, day_of_week: u8) -> Result<PairSelection> {
        let candidates = self.generator.generate(target_time, &self.preferences, self.fallback_range_minutes, PAIR_GAP_MINUTES, self.strategy)?;
        let mut rejected: Vec<RejectedCandidate> = Vec::new();

        for candidate in &candidates {
            let time = &candidate.start_time;
            let courts = matrix.courts_free_for_pair(time);
            if courts.is_empty() {
                continue;
            }

            let scores = self.scorer.score_courts(matrix, &courts, &self.preferred_courts, time, day_of_week);

            for score in scores {
                let pair = match self.build_pair(matrix, date, time, &score.court_id) {
                    Ok(pair) => pair,
                    Err(error) => {
                        log::warn!("Could not build pair on court '{}' at {}: {}", score.court_id, time, error);
                        continue;
                    }
                };

                let report: IsolationReport = self.isolation.check(matrix, &pair);
                if report.has_isolation {
                    log::debug!("Pair on court '{}' at {} would orphan {:?}, skipping.", score.court_id, time, report.orphans);
                    rejected.push(RejectedCandidate {
                        court_id: score.court_id.clone(),
                        time_slot: time.clone(),
                        reason: "isolation".to_string(),
                        orphans: report.orphans,
                    });
                    continue;
                }

                log::info!("Selected pair on court '{}' at {} ({}).", score.court_id, time, score.reason);
                return Ok(PairSelection { pair, score, rejected });
            }
        }

        Err(Error::NoEligiblePair(format!(
            "No conflict-free consecutive pair within {} minute(s) of {} across {} candidate time(s).",
            self.fallback_range_minutes,
            target_time,
            candidates.len()
        )))
    }

    fn build_pair(&self, matrix: &CalendarMatrix, date: &str, time: &str, court_id: &str) -> Result<SlotPair> {
        let follow_up = time_format::checked_add_minutes(time, PAIR_GAP_MINUTES)?
            .ok_or_else(|| Error::NoEligiblePair(format!("No follow-up slot after {}.", time)))?;

        let slot1 = self.build_slot(matrix, date, time, court_id)?;
        let slot2 = self.build_slot(matrix, date, &follow_up, court_id)?;
        SlotPair::new(slot1, slot2)
    }

    fn build_slot(&self, matrix: &CalendarMatrix, date: &str, time: &str, court_id: &str) -> Result<Slot> {
        let cell = matrix
            .get(court_id, time)
            .ok_or_else(|| Error::NoEligiblePair(format!("Cell for court '{}' at {} vanished from the matrix.", court_id, time)))?;

        let mut slot = Slot::new(date, time, court_id, cell.state);
        if let Some(handle) = cell.handle {
            slot = slot.with_handle(handle);
        }
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::cell::{Cell, CellState};
    use crate::domain::clock::clock_mock::MockClock;
    use crate::domain::datetime::date_time_calculator::DateTimeCalculator;
    use crate::domain::pattern::pattern_store::PatternQuery;
    use crate::domain::selection::court_scorer::ScoringWeights;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct NoPatterns;

    impl PatternQuery for NoPatterns {
        fn success_stats(&self, _court_id: &str, _time_slot: &str, _day_of_week: u8) -> Option<(f64, u32)> {
            None
        }
    }

    fn cell(state: CellState) -> Cell {
        Cell { state, class_name: None, raw_attrs: HashMap::new(), handle: None }
    }

    fn selector(preferred_courts: Vec<String>) -> SlotPairSelector {
        let clock: Arc<MockClock> = Arc::new(MockClock::new(0));
        let calculator = Arc::new(DateTimeCalculator::new(chrono_tz::Europe::Berlin, clock.clone()));
        let scorer = CourtScorer::new(ScoringWeights::default(), 3, Arc::new(NoPatterns));
        let generator = TimeSlotGenerator::new(calculator, clock);
        SlotPairSelector::new(scorer, generator, Vec::new(), preferred_courts, 120, FallbackStrategy::Gradual)
    }

    fn matrix_from(cells: &[(&str, &str, CellState)]) -> CalendarMatrix {
        let mut matrix = CalendarMatrix::new();
        for (court, time, state) in cells {
            matrix.insert(court, time, cell(*state));
        }
        matrix.finalize(0);
        matrix
    }

    #[test]
    fn test_selects_target_time_pair_on_preferred_court() {
        let matrix = matrix_from(&[
            ("1", "14:00", CellState::Free),
            ("1", "14:30", CellState::Free),
            ("3", "14:00", CellState::Free),
            ("3", "14:30", CellState::Free),
        ]);

        let selection = selector(vec!["1".to_string(), "3".to_string()]).select(&matrix, "2025-11-23", "14:00", 0).unwrap();
        assert_eq!(selection.pair.court_id, "1");
        assert_eq!(selection.pair.slot1.start_time, "14:00");
        assert_eq!(selection.pair.slot2.start_time, "14:30");
    }

    #[test]
    fn test_falls_back_to_alternative_time() {
        // 14:00 has no pair anywhere; 14:30+15:00 works on court 3.
        let matrix = matrix_from(&[
            ("1", "14:00", CellState::Booked),
            ("3", "14:00", CellState::Booked),
            ("3", "14:30", CellState::Free),
            ("3", "15:00", CellState::Free),
        ]);

        let selection = selector(vec!["1".to_string(), "3".to_string()]).select(&matrix, "2025-11-23", "14:00", 0).unwrap();
        assert_eq!(selection.pair.court_id, "3");
        assert_eq!(selection.pair.slot1.start_time, "14:30");
    }

    #[test]
    fn test_isolating_candidate_is_skipped_for_clean_one() {
        // Court 5 pair would orphan 15:00; court 7 is clean.
        let matrix = matrix_from(&[
            ("5", "14:00", CellState::Free),
            ("5", "14:30", CellState::Free),
            ("5", "15:00", CellState::Free),
            ("5", "15:30", CellState::Booked),
            ("7", "14:00", CellState::Free),
            ("7", "14:30", CellState::Free),
        ]);

        let selection = selector(vec!["5".to_string(), "7".to_string()]).select(&matrix, "2025-11-23", "14:00", 0).unwrap();
        assert_eq!(selection.pair.court_id, "7");

        let rejection = selection.rejected.iter().find(|r| r.court_id == "5").unwrap();
        assert_eq!(rejection.orphans, vec!["15:00"]);
    }

    #[test]
    fn test_no_eligible_pair() {
        let matrix = matrix_from(&[("1", "14:00", CellState::Free), ("1", "14:30", CellState::Booked)]);

        let result = selector(vec!["1".to_string()]).select(&matrix, "2025-11-23", "14:00", 0);
        assert!(matches!(result, Err(Error::NoEligiblePair(_))));
    }
}
