use std::collections::HashMap;

use crate::domain::calendar::calendar_matrix::CalendarMatrix;
use crate::domain::calendar::cell::SlotPair;
use crate::domain::datetime::time_format;

/// Outcome of simulating a pair reservation on one court's timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct IsolationReport {
    pub has_isolation: bool,
    pub orphans: Vec<String>,
}

/// Rejects pairs that would strand single free 30-minute slots.
///
/// A free cell is an orphan when both of its step-distance neighbors are
/// non-free; a missing neighbor (including the timeline boundary) counts
/// as non-free.
#[derive(Debug, Clone)]
pub struct IsolationChecker {
    step_minutes: i32,
}

impl IsolationChecker {
    pub fn new(step_minutes: i32) -> IsolationChecker {
        IsolationChecker { step_minutes }
    }

    pub fn check(&self, matrix: &CalendarMatrix, pair: &SlotPair) -> IsolationReport {
        let mut free_by_minutes: HashMap<i32, bool> = HashMap::new();

        for time in matrix.times_for_court(&pair.court_id) {
            if let Ok(minutes) = time_format::minutes_of_day(&time) {
                free_by_minutes.insert(minutes, matrix.is_free(&pair.court_id, &time));
            }
        }

        // Simulate the reservation.
        for slot in [&pair.slot1, &pair.slot2] {
            if let Ok(minutes) = time_format::minutes_of_day(&slot.start_time) {
                free_by_minutes.insert(minutes, false);
            }
        }

        let mut orphans: Vec<i32> = free_by_minutes
            .iter()
            .filter(|(_, is_free)| **is_free)
            .filter(|(minutes, _)| {
                let before = free_by_minutes.get(&(*minutes - self.step_minutes)).copied().unwrap_or(false);
                let after = free_by_minutes.get(&(*minutes + self.step_minutes)).copied().unwrap_or(false);
                !before && !after
            })
            .map(|(minutes, _)| *minutes)
            .collect();
        orphans.sort();

        IsolationReport { has_isolation: !orphans.is_empty(), orphans: orphans.into_iter().map(time_format::from_minutes).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::cell::{Cell, CellState, Slot};
    use std::collections::HashMap as StdHashMap;

    fn cell(state: CellState) -> Cell {
        Cell { state, class_name: None, raw_attrs: StdHashMap::new(), handle: None }
    }

    fn pair(court: &str, first: &str, second: &str) -> SlotPair {
        SlotPair::new(Slot::new("2025-11-23", first, court, CellState::Free), Slot::new("2025-11-23", second, court, CellState::Free)).unwrap()
    }

    fn matrix_with(court: &str, states: &[(&str, CellState)]) -> CalendarMatrix {
        let mut matrix = CalendarMatrix::new();
        for (time, state) in states {
            matrix.insert(court, time, cell(*state));
        }
        matrix.finalize(0);
        matrix
    }

    #[test]
    fn test_pair_that_orphans_a_following_slot() {
        // 14:00 14:30 15:00 free, 15:30 booked: taking 14:00+14:30 strands 15:00.
        let matrix = matrix_with(
            "5",
            &[("14:00", CellState::Free), ("14:30", CellState::Free), ("15:00", CellState::Free), ("15:30", CellState::Booked)],
        );

        let report = IsolationChecker::new(30).check(&matrix, &pair("5", "14:00", "14:30"));
        assert!(report.has_isolation);
        assert_eq!(report.orphans, vec!["15:00"]);
    }

    #[test]
    fn test_pair_with_open_run_after_it_is_fine() {
        let matrix = matrix_with(
            "5",
            &[("14:00", CellState::Free), ("14:30", CellState::Free), ("15:00", CellState::Free), ("15:30", CellState::Free)],
        );

        let report = IsolationChecker::new(30).check(&matrix, &pair("5", "14:00", "14:30"));
        assert!(!report.has_isolation);
        assert!(report.orphans.is_empty());
    }

    #[test]
    fn test_boundary_counts_as_non_free() {
        // 13:30 is the first slot of the day for this court; taking
        // 14:00+14:30 leaves it with the boundary on one side and the
        // booked pair on the other.
        let matrix = matrix_with("5", &[("13:30", CellState::Free), ("14:00", CellState::Free), ("14:30", CellState::Free)]);

        let report = IsolationChecker::new(30).check(&matrix, &pair("5", "14:00", "14:30"));
        assert!(report.has_isolation);
        assert_eq!(report.orphans, vec!["13:30"]);
    }

    #[test]
    fn test_gap_in_timeline_counts_as_non_free() {
        // No 15:30 cell at all: 15:00 has a hole on one side.
        let matrix = matrix_with(
            "5",
            &[("14:00", CellState::Free), ("14:30", CellState::Free), ("15:00", CellState::Free), ("16:00", CellState::Free)],
        );

        let report = IsolationChecker::new(30).check(&matrix, &pair("5", "14:00", "14:30"));
        assert!(report.has_isolation);
        assert!(report.orphans.contains(&"15:00".to_string()));
    }
}
