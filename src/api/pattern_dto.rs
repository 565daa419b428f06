use serde::{Deserialize, Serialize};

/// Persisted shape of one learned booking pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingPatternDto {
    pub court_id: String,
    pub time_slot: String,
    pub day_of_week: u8,
    pub successes: u32,
    pub attempts: u32,
    pub success_rate: f64,
    pub last_updated: i64,
}
