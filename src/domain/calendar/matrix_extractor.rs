use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::calendar::calendar_matrix::CalendarMatrix;
use crate::domain::calendar::cell::{Cell, CellState};
use crate::domain::clock::clock::SystemClock;
use crate::domain::driver::page_driver::{ElementHandle, PageDriver};
use crate::domain::selector::fallback_engine::SelectorFallbackEngine;
use crate::domain::selector::tiers::SelectorCategory;
use crate::error::Result;

const CELL_ATTRS: [&str; 4] = ["data-date", "data-start", "data-state", "data-court"];

/// Builds the [`CalendarMatrix`] in a single pass over the calendar page.
///
/// A stray cell (missing attributes, unreadable handle, broken time string)
/// becomes a warning in the metrics and never fails the extraction; only a
/// total selector failure surfaces as an error.
#[derive(Debug)]
pub struct MatrixExtractor {
    clock: Arc<dyn SystemClock>,
}

impl MatrixExtractor {
    pub fn new(clock: Arc<dyn SystemClock>) -> MatrixExtractor {
        MatrixExtractor { clock }
    }

    pub async fn extract(&self, driver: &dyn PageDriver, engine: &mut SelectorFallbackEngine) -> Result<CalendarMatrix> {
        let started = self.clock.now_ms();

        let matched = engine.find(driver, SelectorCategory::Slot).await?.require(SelectorCategory::Slot)?;
        log::info!("Extracting calendar matrix from {} cell(s) (tier {:?}).", matched.elements_found(), matched.tier);

        let mut matrix = CalendarMatrix::new();

        for handle in matched.elements {
            match self.read_cell(driver, handle).await {
                Ok(Some((court, time, cell))) => matrix.insert(&court, &time, cell),
                Ok(None) => matrix.metrics.warnings.push(format!("Cell {:?} is missing one of the required data attributes.", handle)),
                Err(error) => matrix.metrics.warnings.push(format!("Failed to read cell {:?}: {}", handle, error)),
            }
        }

        matrix.finalize((self.clock.now_ms() - started).max(0) as u64);

        if !matrix.metrics.warnings.is_empty() {
            log::warn!("Matrix extraction finished with {} warning(s).", matrix.metrics.warnings.len());
        }
        log::info!(
            "Matrix ready: {} courts, {} time slots, {} free of {} cells.",
            matrix.courts.len(),
            matrix.time_slots.len(),
            matrix.metrics.free_cells,
            matrix.metrics.total_cells
        );

        Ok(matrix)
    }

    async fn read_cell(&self, driver: &dyn PageDriver, handle: ElementHandle) -> Result<Option<(String, String, Cell)>> {
        let mut raw_attrs: HashMap<String, String> = HashMap::new();

        for name in CELL_ATTRS {
            if let Some(value) = driver.get_attribute(handle, name).await? {
                raw_attrs.insert(name.to_string(), value);
            }
        }

        if !raw_attrs.contains_key("data-date") {
            return Ok(None);
        }
        let (Some(court), Some(time)) = (raw_attrs.get("data-court"), raw_attrs.get("data-start")) else {
            return Ok(None);
        };

        let state = raw_attrs.get("data-state").map(|value| CellState::from_attr(value)).unwrap_or(CellState::Unknown);
        let class_name = driver.get_attribute(handle, "class").await.unwrap_or(None);

        let court = court.clone();
        let time = time.clone();
        Ok(Some((court, time, Cell { state, class_name, raw_attrs, handle: Some(handle) })))
    }
}
