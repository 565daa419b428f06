use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::datetime::time_format;
use crate::domain::driver::page_driver::ElementHandle;
use crate::error::{Error, Result};

/// State label carried by a calendar cell's `data-state` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellState {
    Free,
    Booked,
    Unavailable,
    Unknown,
}

impl CellState {
    pub fn from_attr(value: &str) -> CellState {
        match value {
            "free" => CellState::Free,
            "booked" | "reserved" | "occupied" => CellState::Booked,
            "unavailable" | "blocked" | "closed" => CellState::Unavailable,
            _ => CellState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CellState::Free => "free",
            CellState::Booked => "booked",
            CellState::Unavailable => "unavailable",
            CellState::Unknown => "unknown",
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, CellState::Free)
    }
}

/// One extracted calendar cell with the raw attributes it was built from.
#[derive(Debug, Clone)]
pub struct Cell {
    pub state: CellState,
    pub class_name: Option<String>,
    pub raw_attrs: HashMap<String, String>,
    pub handle: Option<ElementHandle>,
}

/// A 30-minute booking unit on one court. Immutable during an attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slot {
    pub date: String,
    pub start_time: String,
    pub court_id: String,
    pub state: CellState,
    #[serde(skip)]
    pub handle: Option<ElementHandle>,
}

impl Slot {
    pub fn new(date: impl Into<String>, start_time: impl Into<String>, court_id: impl Into<String>, state: CellState) -> Slot {
        Slot { date: date.into(), start_time: start_time.into(), court_id: court_id.into(), state, handle: None }
    }

    pub fn with_handle(mut self, handle: ElementHandle) -> Slot {
        self.handle = Some(handle);
        self
    }
}

/// Two consecutive free slots on the same court, forming one 60-minute
/// reservation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotPair {
    pub court_id: String,
    pub slot1: Slot,
    pub slot2: Slot,
}

impl SlotPair {
    /// Validates the pair invariant: same court, same date, exactly 30
    /// minutes apart, both free.
    pub fn new(slot1: Slot, slot2: Slot) -> Result<SlotPair> {
        if slot1.court_id != slot2.court_id {
            return Err(Error::ValidationError(format!("Slot pair spans courts '{}' and '{}'.", slot1.court_id, slot2.court_id)));
        }
        if slot1.date != slot2.date {
            return Err(Error::ValidationError(format!("Slot pair spans dates '{}' and '{}'.", slot1.date, slot2.date)));
        }

        let gap = time_format::minutes_of_day(&slot2.start_time)? - time_format::minutes_of_day(&slot1.start_time)?;
        if gap != 30 {
            return Err(Error::ValidationError(format!("Slots '{}' and '{}' are {} minutes apart, expected 30.", slot1.start_time, slot2.start_time, gap)));
        }

        if !slot1.state.is_free() || !slot2.state.is_free() {
            return Err(Error::ValidationError(format!(
                "Slot pair requires both slots free, got '{}' and '{}'.",
                slot1.state.as_str(),
                slot2.state.as_str()
            )));
        }

        let court_id = slot1.court_id.clone();
        Ok(SlotPair { court_id, slot1, slot2 })
    }
}
