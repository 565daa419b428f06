use std::sync::Arc;

use crate::api::config_dto::BookingConfigDto;
use crate::api::report_dto::RunReportDto;
use crate::domain::booking::analytics::BookingAnalytics;
use crate::domain::booking::booking_result::BookingResult;
use crate::domain::booking::state_machine::BookingStateMachine;
use crate::domain::clock::clock::{SystemClock, WallClock};
use crate::domain::config::BookingConfig;
use crate::domain::driver::page_driver::PageDriver;
use crate::domain::pattern::pattern_store::PatternStore;
use crate::error::Result;
use crate::loader::parser::{parse_json_file, write_json_file};

pub mod api;
pub mod domain;
pub mod loader;
pub mod logger;
pub mod error;

/// Loads the operator configuration: JSON file, then environment
/// overrides, then validation. An invalid configuration refuses to run.
pub fn load_config(file_path: &str) -> Result<BookingConfig> {
    let mut dto: BookingConfigDto = parse_json_file(file_path)?;
    log::info!("Configuration parsed from '{}'.", file_path);

    domain::config::apply_env_overrides(&mut dto);
    BookingConfig::from_dto(dto)
}

/// Wires the full engine against the given page driver and executes one
/// booking run, persisting learned patterns and the run report afterwards.
pub async fn run_booking(driver: Arc<dyn PageDriver>, config: BookingConfig) -> BookingResult {
    let clock: Arc<dyn SystemClock> = Arc::new(WallClock::new());

    let patterns = Arc::new(PatternStore::new(
        config.pattern_learning.enabled,
        config.pattern_learning.store_path.clone(),
        config.pattern_learning.retention_days,
        clock.clone(),
    ));
    patterns.load();

    let analytics = Arc::new(BookingAnalytics::new());

    let mut machine = BookingStateMachine::new(driver, config.clone(), clock.clone(), patterns.clone(), patterns.clone(), analytics.clone());
    let result = machine.run().await;

    patterns.flush();

    let report = RunReportDto {
        correlation_id: result.correlation_id.clone(),
        generated_at_ms: clock.now_ms(),
        dry_run: config.dry_run,
        result: result.clone(),
        analytics: analytics.snapshot(),
        selector_cache: machine.cache_metrics().await,
    };

    let report_path = config.output_dir.join(format!("run-{}.json", &result.correlation_id[..8.min(result.correlation_id.len())]));
    if let Err(error) = write_json_file(&report_path, &report) {
        log::warn!("Could not write run report to '{}': {}", report_path.display(), error);
    }

    let csv_path = config.output_dir.join("detections.csv");
    if let Err(error) = analytics.export_csv(&csv_path) {
        log::warn!("Could not write detection metrics to '{}': {}", csv_path.display(), error);
    }

    result
}
