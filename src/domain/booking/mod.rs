pub mod analytics;
pub mod booking_result;
pub mod cookie_consent;
pub mod dry_run_validator;
pub mod state_machine;
pub mod success_detector;
