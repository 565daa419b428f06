use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::calendar::cell::SlotPair;
use crate::domain::resilience::retry_engine::AttemptDetail;

/// How the success detector concluded that a booking went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    Network,
    DomAttribute,
    UrlPattern,
    TextFallback,
    None,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Network => "network",
            DetectionMethod::DomAttribute => "dom-attribute",
            DetectionMethod::UrlPattern => "url-pattern",
            DetectionMethod::TextFallback => "text-fallback",
            DetectionMethod::None => "none",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Conclusion of the success-detection pipeline for one commit action.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSuccessResult {
    pub success: bool,
    pub method: DetectionMethod,
    pub confirmation_id: Option<String>,
    pub timestamp_ms: i64,
    pub additional_data: Map<String, Value>,
}

impl BookingSuccessResult {
    pub fn detected(method: DetectionMethod, confirmation_id: Option<String>, timestamp_ms: i64) -> BookingSuccessResult {
        BookingSuccessResult { success: true, method, confirmation_id, timestamp_ms, additional_data: Map::new() }
    }

    pub fn not_detected(timestamp_ms: i64) -> BookingSuccessResult {
        BookingSuccessResult { success: false, method: DetectionMethod::None, confirmation_id: None, timestamp_ms, additional_data: Map::new() }
    }

    /// Synthetic confirmation for a dry run whose commit was suppressed.
    pub fn dry_run(timestamp_ms: i64) -> BookingSuccessResult {
        let mut additional_data = Map::new();
        additional_data.insert("dryRun".to_string(), Value::Bool(true));
        BookingSuccessResult { success: true, method: DetectionMethod::None, confirmation_id: None, timestamp_ms, additional_data }
    }

    pub fn is_dry_run(&self) -> bool {
        self.additional_data.get("dryRun").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn with_data(mut self, key: &str, value: Value) -> BookingSuccessResult {
        self.additional_data.insert(key.to_string(), value);
        self
    }
}

/// User-visible outcome of one booking run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResult {
    pub success: bool,
    pub booked_pair: Option<SlotPair>,
    pub confirmation: Option<BookingSuccessResult>,
    pub error: Option<String>,
    pub retry_attempts: u32,
    pub retry_details: Vec<AttemptDetail>,
    pub circuit_breaker_tripped: bool,
    pub timestamp_ms: i64,
    pub correlation_id: String,
}
