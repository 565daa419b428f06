use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use crate::domain::calendar::cell::{Cell, CellState};
use crate::domain::datetime::time_format;

/// Orders court ids numerically when both parse as numbers, otherwise by
/// trailing digits, otherwise lexically. "2" sorts before "10".
pub fn compare_court_ids(a: &str, b: &str) -> Ordering {
    match (court_sort_key(a), court_sort_key(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn court_sort_key(id: &str) -> Option<u64> {
    if let Ok(n) = id.parse::<u64>() {
        return Some(n);
    }
    let digits: String = id.chars().rev().take_while(|c| c.is_ascii_digit()).collect::<String>().chars().rev().collect();
    digits.parse::<u64>().ok()
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionMetrics {
    pub total_cells: usize,
    pub free_cells: usize,
    pub booked_cells: usize,
    pub unavailable_cells: usize,
    pub courts_with_data: usize,
    pub time_slots_with_data: usize,
    pub extraction_duration_ms: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    PreferDom,
    PreferNetwork,
    MarkUncertain,
}

impl ConflictResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictResolution::PreferDom => "prefer-dom",
            ConflictResolution::PreferNetwork => "prefer-network",
            ConflictResolution::MarkUncertain => "mark-uncertain",
        }
    }
}

/// Disagreement between the DOM extraction and the network-sourced view.
#[derive(Debug, Clone)]
pub struct AvailabilityConflict {
    pub court_id: String,
    pub time_slot: String,
    pub dom_state: Option<CellState>,
    pub network_state: CellState,
    pub resolution: ConflictResolution,
    pub reason: String,
}

/// Precomputed court × time grid of cell states for O(1) lookup.
///
/// Built once per search pass; any navigation that changes the date or the
/// venue parameters invalidates it and a fresh extraction runs.
#[derive(Debug, Default)]
pub struct CalendarMatrix {
    cells: HashMap<String, HashMap<String, Cell>>,
    pub courts: Vec<String>,
    pub time_slots: Vec<String>,
    pub date_range: Option<(String, String)>,
    pub metrics: ExtractionMetrics,
    pub conflicts: Vec<AvailabilityConflict>,
}

impl CalendarMatrix {
    pub fn new() -> CalendarMatrix {
        CalendarMatrix::default()
    }

    /// Inserts one cell. `time` accepts `HH:MM` or compact `HHMM`.
    pub fn insert(&mut self, court_id: &str, time: &str, cell: Cell) {
        let Ok(normalized) = time_format::to_colon(time) else {
            self.metrics.warnings.push(format!("Dropped cell with unparseable time '{}' on court '{}'.", time, court_id));
            return;
        };

        self.cells.entry(court_id.to_string()).or_default().insert(normalized, cell);
    }

    /// Recomputes the derived court list, time axis, date range and counts.
    /// Called once after the extraction pass finished inserting.
    pub fn finalize(&mut self, extraction_duration_ms: u64) {
        let mut courts: Vec<String> = self.cells.keys().cloned().collect();
        courts.sort_by(|a, b| compare_court_ids(a, b));
        self.courts = courts;

        let mut times: BTreeSet<String> = BTreeSet::new();
        let mut dates: BTreeSet<String> = BTreeSet::new();
        let mut free = 0;
        let mut booked = 0;
        let mut unavailable = 0;
        let mut total = 0;

        for per_court in self.cells.values() {
            for (time, cell) in per_court {
                times.insert(time.clone());
                if let Some(date) = cell.raw_attrs.get("data-date") {
                    dates.insert(date.clone());
                }
                total += 1;
                match cell.state {
                    CellState::Free => free += 1,
                    CellState::Booked => booked += 1,
                    CellState::Unavailable => unavailable += 1,
                    CellState::Unknown => {}
                }
            }
        }

        self.time_slots = times.into_iter().collect();
        self.date_range = match (dates.iter().next(), dates.iter().next_back()) {
            (Some(first), Some(last)) => Some((first.clone(), last.clone())),
            _ => None,
        };

        self.metrics.total_cells = total;
        self.metrics.free_cells = free;
        self.metrics.booked_cells = booked;
        self.metrics.unavailable_cells = unavailable;
        self.metrics.courts_with_data = self.cells.values().filter(|c| !c.is_empty()).count();
        self.metrics.time_slots_with_data = self.time_slots.len();
        self.metrics.extraction_duration_ms = extraction_duration_ms;
    }

    pub fn get(&self, court_id: &str, time: &str) -> Option<&Cell> {
        let normalized = time_format::to_colon(time).ok()?;
        self.cells.get(court_id)?.get(&normalized)
    }

    pub fn state_of(&self, court_id: &str, time: &str) -> Option<CellState> {
        self.get(court_id, time).map(|cell| cell.state)
    }

    pub fn is_free(&self, court_id: &str, time: &str) -> bool {
        self.state_of(court_id, time).map(|state| state.is_free()).unwrap_or(false)
    }

    /// Courts whose cells at `time` and `time + 30min` are both free.
    pub fn courts_free_for_pair(&self, time: &str) -> Vec<String> {
        let Ok(Some(follow_up)) = time_format::checked_add_minutes(time, 30) else {
            return Vec::new();
        };

        self.courts.iter().filter(|court| self.is_free(court, time) && self.is_free(court, &follow_up)).cloned().collect()
    }

    /// Ordered times that exist for this court.
    pub fn times_for_court(&self, court_id: &str) -> Vec<String> {
        let mut times: Vec<String> = self.cells.get(court_id).map(|per_court| per_court.keys().cloned().collect()).unwrap_or_default();
        times.sort();
        times
    }

    /// Reconciles against a network-sourced availability view. Conflicting
    /// cells are retained in `conflicts` with the applied resolution.
    pub fn reconcile_with_network(&mut self, network_view: &HashMap<(String, String), CellState>, resolution: ConflictResolution) {
        for ((court_id, time), network_state) in network_view {
            let Ok(normalized) = time_format::to_colon(time) else {
                continue;
            };

            let dom_state = self.state_of(court_id, &normalized);
            if dom_state == Some(*network_state) {
                continue;
            }

            let reason = match dom_state {
                Some(dom) => format!("DOM shows '{}', network shows '{}'.", dom.as_str(), network_state.as_str()),
                None => format!("Cell missing from DOM, network shows '{}'.", network_state.as_str()),
            };

            log::warn!("Availability conflict on court '{}' at {}: {} Resolving with '{}'.", court_id, normalized, reason, resolution.as_str());

            self.conflicts.push(AvailabilityConflict {
                court_id: court_id.clone(),
                time_slot: normalized.clone(),
                dom_state,
                network_state: *network_state,
                resolution,
                reason,
            });

            match resolution {
                ConflictResolution::PreferDom => {}
                ConflictResolution::PreferNetwork => {
                    if let Some(per_court) = self.cells.get_mut(court_id) {
                        if let Some(cell) = per_court.get_mut(&normalized) {
                            cell.state = *network_state;
                        }
                    }
                }
                ConflictResolution::MarkUncertain => {
                    if let Some(per_court) = self.cells.get_mut(court_id) {
                        if let Some(cell) = per_court.get_mut(&normalized) {
                            cell.state = CellState::Unknown;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(state: CellState, date: &str) -> Cell {
        let mut raw_attrs = HashMap::new();
        raw_attrs.insert("data-date".to_string(), date.to_string());
        Cell { state, class_name: None, raw_attrs, handle: None }
    }

    fn sample_matrix() -> CalendarMatrix {
        let mut matrix = CalendarMatrix::new();
        matrix.insert("1", "1400", cell(CellState::Free, "2025-11-23"));
        matrix.insert("1", "1430", cell(CellState::Free, "2025-11-23"));
        matrix.insert("1", "1500", cell(CellState::Booked, "2025-11-23"));
        matrix.insert("10", "1400", cell(CellState::Free, "2025-11-23"));
        matrix.insert("2", "1400", cell(CellState::Unavailable, "2025-11-23"));
        matrix.finalize(12);
        matrix
    }

    #[test]
    fn test_lookup_normalizes_both_notations() {
        let matrix = sample_matrix();
        assert!(matrix.is_free("1", "14:00"));
        assert!(matrix.is_free("1", "1400"));
        assert!(!matrix.is_free("1", "15:00"));
        assert!(!matrix.is_free("9", "14:00"));
    }

    #[test]
    fn test_courts_sorted_numerically() {
        let matrix = sample_matrix();
        assert_eq!(matrix.courts, vec!["1", "2", "10"]);
    }

    #[test]
    fn test_metrics_counts() {
        let matrix = sample_matrix();
        assert_eq!(matrix.metrics.total_cells, 5);
        assert_eq!(matrix.metrics.free_cells, 3);
        assert_eq!(matrix.metrics.booked_cells, 1);
        assert_eq!(matrix.metrics.unavailable_cells, 1);
        assert_eq!(matrix.metrics.courts_with_data, 3);
        assert_eq!(matrix.date_range, Some(("2025-11-23".to_string(), "2025-11-23".to_string())));
    }

    #[test]
    fn test_courts_free_for_pair() {
        let matrix = sample_matrix();
        // Court 1 has 14:00 and 14:30 free; court 10 only 14:00.
        assert_eq!(matrix.courts_free_for_pair("14:00"), vec!["1"]);
        assert!(matrix.courts_free_for_pair("23:45").is_empty());
    }

    #[test]
    fn test_unparseable_time_becomes_a_warning() {
        let mut matrix = CalendarMatrix::new();
        matrix.insert("1", "25:99", cell(CellState::Free, "2025-11-23"));
        matrix.finalize(0);
        assert_eq!(matrix.metrics.total_cells, 0);
        assert_eq!(matrix.metrics.warnings.len(), 1);
    }

    #[test]
    fn test_network_reconciliation_prefer_network() {
        let mut matrix = sample_matrix();
        let mut view = HashMap::new();
        view.insert(("1".to_string(), "14:00".to_string()), CellState::Booked);
        view.insert(("1".to_string(), "14:30".to_string()), CellState::Free);

        matrix.reconcile_with_network(&view, ConflictResolution::PreferNetwork);

        assert_eq!(matrix.conflicts.len(), 1);
        assert_eq!(matrix.conflicts[0].resolution, ConflictResolution::PreferNetwork);
        assert!(!matrix.is_free("1", "14:00"));
    }

    #[test]
    fn test_network_reconciliation_mark_uncertain() {
        let mut matrix = sample_matrix();
        let mut view = HashMap::new();
        view.insert(("1".to_string(), "1400".to_string()), CellState::Booked);

        matrix.reconcile_with_network(&view, ConflictResolution::MarkUncertain);
        assert_eq!(matrix.state_of("1", "14:00"), Some(CellState::Unknown));
    }
}
