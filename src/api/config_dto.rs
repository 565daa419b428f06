use serde::Deserialize;

use crate::domain::selection::time_slot_generator::TimePreference;

fn default_true() -> bool {
    true
}

fn default_days_ahead() -> i64 {
    20
}

fn default_target_time() -> String {
    "14:00".to_string()
}

fn default_duration() -> i32 {
    60
}

fn default_timezone() -> String {
    "Europe/Berlin".to_string()
}

fn default_fallback_range() -> i32 {
    120
}

fn default_strategy() -> String {
    "gradual".to_string()
}

fn default_output_dir() -> String {
    "reports".to_string()
}

/// Raw operator configuration as read from the JSON file, before
/// environment overrides and validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfigDto {
    pub base_url: String,
    #[serde(default = "default_days_ahead")]
    pub days_ahead: i64,
    #[serde(default = "default_target_time")]
    pub target_start_time: String,
    #[serde(default = "default_duration")]
    pub duration: i32,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub preferred_courts: Vec<String>,
    #[serde(default = "default_fallback_range")]
    pub fallback_time_range: i32,
    #[serde(default)]
    pub court_scoring_weights: Option<ScoringWeightsDto>,
    #[serde(default)]
    pub time_preferences: Vec<TimePreference>,
    #[serde(default = "default_strategy")]
    pub fallback_strategy: String,
    #[serde(default)]
    pub retry: RetryDto,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerDto,
    #[serde(default)]
    pub selector_cache: SelectorCacheDto,
    #[serde(default)]
    pub success_detection: SuccessDetectionDto,
    #[serde(default)]
    pub pattern_learning: PatternLearningDto,
    #[serde(default = "default_true")]
    pub dry_run: bool,
    /// Must be set to run with `dryRun: false`; refusing by default keeps
    /// an exploratory run from ever committing a real booking.
    #[serde(default)]
    pub confirm_live: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringWeightsDto {
    pub availability: f64,
    pub historical: f64,
    pub preference: f64,
    pub position: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryDto {
    pub max_retries: u32,
    pub initial_delay: u64,
    pub max_delay: u64,
    pub backoff_multiplier: f64,
    pub jitter_ratio: f64,
}

impl Default for RetryDto {
    fn default() -> Self {
        RetryDto { max_retries: 3, initial_delay: 1_000, max_delay: 15_000, backoff_multiplier: 2.0, jitter_ratio: 0.25 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerDto {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub open_timeout_ms: i64,
    pub success_threshold: u32,
    #[serde(default = "default_true")]
    pub reset_on_success: bool,
}

impl Default for CircuitBreakerDto {
    fn default() -> Self {
        CircuitBreakerDto { enabled: true, failure_threshold: 5, open_timeout_ms: 30_000, success_threshold: 2, reset_on_success: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorCacheDto {
    pub enabled: bool,
    pub max_size: usize,
    pub ttl_ms: i64,
}

impl Default for SelectorCacheDto {
    fn default() -> Self {
        SelectorCacheDto { enabled: true, max_size: 256, ttl_ms: 10 * 60 * 1_000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessDetectionDto {
    pub network_timeout: u64,
    pub dom_timeout: u64,
    pub url_check_interval: u64,
    pub enable_network: bool,
    pub enable_dom: bool,
    pub enable_url: bool,
    pub enable_text_fallback: bool,
    #[serde(default)]
    pub success_keywords: Vec<String>,
}

impl Default for SuccessDetectionDto {
    fn default() -> Self {
        SuccessDetectionDto {
            network_timeout: 10_000,
            dom_timeout: 6_000,
            url_check_interval: 500,
            enable_network: true,
            enable_dom: true,
            enable_url: true,
            enable_text_fallback: false,
            success_keywords: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternLearningDto {
    pub enabled: bool,
    pub retention_days: i64,
    pub min_attempts: u32,
    #[serde(default)]
    pub store_path: Option<String>,
}

impl Default for PatternLearningDto {
    fn default() -> Self {
        PatternLearningDto { enabled: true, retention_days: 90, min_attempts: 3, store_path: Some("patterns.json".to_string()) }
    }
}
