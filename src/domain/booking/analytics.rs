use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::domain::booking::booking_result::{BookingResult, DetectionMethod};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionStats {
    pub attempts: u64,
    pub successes: u64,
    pub total_duration_ms: u64,
}

/// Aggregated counters for one process lifetime.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub retry_attempts_total: u64,
    pub circuit_breaker_trips: u64,
    pub detection: BTreeMap<String, DetectionStats>,
}

/// Collects success metrics across runs and detection strategies, and
/// exports them as JSON snapshots or a CSV table.
#[derive(Debug, Default)]
pub struct BookingAnalytics {
    inner: Mutex<AnalyticsSnapshot>,
}

impl BookingAnalytics {
    pub fn new() -> BookingAnalytics {
        BookingAnalytics::default()
    }

    pub fn record_detection(&self, method: DetectionMethod, success: bool, duration_ms: u64) {
        let mut inner = self.inner.lock().unwrap();
        let stats = inner.detection.entry(method.as_str().to_string()).or_default();
        stats.attempts += 1;
        if success {
            stats.successes += 1;
        }
        stats.total_duration_ms += duration_ms;
    }

    pub fn record_run(&self, result: &BookingResult) {
        let mut inner = self.inner.lock().unwrap();
        inner.runs += 1;
        if result.success {
            inner.successful_runs += 1;
        } else {
            inner.failed_runs += 1;
        }
        inner.retry_attempts_total += result.retry_attempts as u64;
        if result.circuit_breaker_tripped {
            inner.circuit_breaker_trips += 1;
        }
    }

    pub fn snapshot(&self) -> AnalyticsSnapshot {
        self.inner.lock().unwrap().clone()
    }

    /// One CSV row per detection method, for offline analysis of which
    /// strategies actually conclude bookings.
    pub fn export_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let snapshot = self.snapshot();
        let mut writer = csv::Writer::from_path(path).map_err(|e| std::io::Error::other(e))?;

        writer.write_record(["method", "attempts", "successes", "totalDurationMs"]).map_err(|e| std::io::Error::other(e))?;
        for (method, stats) in &snapshot.detection {
            writer
                .write_record([method.as_str(), &stats.attempts.to_string(), &stats.successes.to_string(), &stats.total_duration_ms.to_string()])
                .map_err(|e| std::io::Error::other(e))?;
        }
        writer.flush()?;
        Ok(())
    }
}
