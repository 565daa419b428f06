use serde::Serialize;

use crate::domain::booking::analytics::AnalyticsSnapshot;
use crate::domain::booking::booking_result::BookingResult;
use crate::domain::selector::selector_cache::CacheMetrics;

/// Per-run JSON report written to the configured output directory.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReportDto {
    pub correlation_id: String,
    pub generated_at_ms: i64,
    pub dry_run: bool,
    pub result: BookingResult,
    pub analytics: AnalyticsSnapshot,
    pub selector_cache: CacheMetrics,
}
