use chrono::NaiveDate;

use crate::domain::booking::booking_result::{BookingSuccessResult, DetectionMethod};
use crate::domain::config::BookingConfig;
use crate::error::{Error, Result};

/// Pre-flight and result checks guarding the safety contract: an
/// exploratory run must never issue a real transaction, and a live run
/// must have been asked for explicitly.
#[derive(Debug, Clone, Default)]
pub struct DryRunValidator;

impl DryRunValidator {
    pub fn new() -> DryRunValidator {
        DryRunValidator
    }

    pub fn validate_preflight(&self, config: &BookingConfig, target_date: NaiveDate, today: NaiveDate) -> Result<()> {
        if target_date < today {
            return Err(Error::ValidationError(format!("Target date {} is in the past (today is {}).", target_date, today)));
        }

        if !config.dry_run && !config.confirm_live {
            return Err(Error::ValidationError(
                "Refusing to run with dryRun=false without confirmLive=true; a live run must be requested explicitly.".to_string(),
            ));
        }

        if !config.dry_run {
            log::warn!("Live mode: this run will commit a real booking for {}.", target_date);
        }

        Ok(())
    }

    /// Sanity-checks what the detector concluded against the mode the run
    /// was started in.
    pub fn validate_result(&self, result: &BookingSuccessResult, dry_run: bool) -> Result<()> {
        if dry_run {
            if result.success && !result.is_dry_run() {
                return Err(Error::ValidationError("Dry run produced a non-synthetic confirmation; the commit suppression was bypassed.".to_string()));
            }
            return Ok(());
        }

        if result.success && result.method == DetectionMethod::None {
            return Err(Error::ValidationError("Live run reported success without any detection method concluding it.".to_string()));
        }

        Ok(())
    }
}
