use chrono_tz::Tz;
use std::path::PathBuf;

use crate::api::config_dto::BookingConfigDto;
use crate::domain::datetime::time_format;
use crate::domain::resilience::circuit_breaker::CircuitBreakerConfig;
use crate::domain::resilience::retry_engine::RetryConfig;
use crate::domain::selection::court_scorer::ScoringWeights;
use crate::domain::selection::time_slot_generator::{FallbackStrategy, TimePreference};
use crate::error::{Error, Result};

/// Slot length on the booking grid; a 60-minute reservation is two of
/// these back to back.
pub const SLOT_MINUTES: i32 = 30;

#[derive(Debug, Clone)]
pub struct SelectorCacheConfig {
    pub enabled: bool,
    pub max_size: usize,
    pub ttl_ms: i64,
}

#[derive(Debug, Clone)]
pub struct SuccessDetectionSettings {
    pub network_timeout_ms: u64,
    pub dom_timeout_ms: u64,
    pub url_check_interval_ms: u64,
    pub enable_network: bool,
    pub enable_dom: bool,
    pub enable_url: bool,
    pub enable_text_fallback: bool,
    pub success_keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PatternLearningConfig {
    pub enabled: bool,
    pub retention_days: i64,
    pub min_attempts: u32,
    pub store_path: Option<PathBuf>,
}

/// Validated operator configuration. Construction is the only place the
/// raw DTO is trusted; everything downstream can rely on these values.
#[derive(Debug, Clone)]
pub struct BookingConfig {
    pub base_url: String,
    pub days_ahead: i64,
    pub target_start_time: String,
    pub duration_minutes: i32,
    pub timezone: Tz,
    pub preferred_courts: Vec<String>,
    pub fallback_time_range: i32,
    pub scoring_weights: ScoringWeights,
    pub time_preferences: Vec<TimePreference>,
    pub fallback_strategy: FallbackStrategy,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub selector_cache: SelectorCacheConfig,
    pub success_detection: SuccessDetectionSettings,
    pub pattern_learning: PatternLearningConfig,
    pub dry_run: bool,
    pub confirm_live: bool,
    pub output_dir: PathBuf,
}

impl BookingConfig {
    pub fn from_dto(dto: BookingConfigDto) -> Result<BookingConfig> {
        if dto.base_url.is_empty() || !dto.base_url.starts_with("http") {
            return Err(Error::InvalidConfig(format!("baseUrl must be an absolute http(s) URL, got '{}'.", dto.base_url)));
        }

        if dto.days_ahead < 0 {
            return Err(Error::InvalidConfig(format!("daysAhead must be non-negative, got {}.", dto.days_ahead)));
        }

        time_format::parse_hh_mm(&dto.target_start_time)?;

        if dto.duration != 2 * SLOT_MINUTES {
            return Err(Error::InvalidConfig(format!("duration must be {} minutes (two {}-minute slots), got {}.", 2 * SLOT_MINUTES, SLOT_MINUTES, dto.duration)));
        }

        let timezone: Tz = dto.timezone.parse().map_err(|_| Error::InvalidConfig(format!("Unknown IANA timezone '{}'.", dto.timezone)))?;

        if dto.fallback_time_range < 0 {
            return Err(Error::InvalidConfig(format!("fallbackTimeRange must be non-negative, got {}.", dto.fallback_time_range)));
        }

        let scoring_weights = match dto.court_scoring_weights {
            Some(weights) => ScoringWeights {
                availability: weights.availability,
                historical: weights.historical,
                preference: weights.preference,
                position: weights.position,
            },
            None => ScoringWeights::default(),
        };
        scoring_weights.validate()?;

        for preference in &dto.time_preferences {
            time_format::parse_hh_mm(&preference.start_time)?;
            if !(1..=10).contains(&preference.priority) {
                return Err(Error::InvalidConfig(format!("Time preference priority must be in 1..=10, got {}.", preference.priority)));
            }
            if preference.flexibility_minutes < 0 {
                return Err(Error::InvalidConfig(format!("Time preference flexibility must be non-negative, got {}.", preference.flexibility_minutes)));
            }
        }

        let fallback_strategy = FallbackStrategy::from_name(&dto.fallback_strategy)?;

        if dto.retry.max_retries == 0 {
            return Err(Error::InvalidConfig("retry.maxRetries must be at least 1.".to_string()));
        }
        if dto.retry.backoff_multiplier < 1.0 {
            return Err(Error::InvalidConfig(format!("retry.backoffMultiplier must be >= 1, got {}.", dto.retry.backoff_multiplier)));
        }
        if !(0.0..=1.0).contains(&dto.retry.jitter_ratio) {
            return Err(Error::InvalidConfig(format!("retry.jitterRatio must be in [0, 1], got {}.", dto.retry.jitter_ratio)));
        }
        if dto.retry.max_delay < dto.retry.initial_delay {
            return Err(Error::InvalidConfig("retry.maxDelay must be >= retry.initialDelay.".to_string()));
        }

        if dto.circuit_breaker.failure_threshold == 0 || dto.circuit_breaker.success_threshold == 0 {
            return Err(Error::InvalidConfig("Circuit breaker thresholds must be at least 1.".to_string()));
        }

        if dto.success_detection.url_check_interval == 0 {
            return Err(Error::InvalidConfig("successDetection.urlCheckInterval must be positive.".to_string()));
        }

        Ok(BookingConfig {
            base_url: dto.base_url,
            days_ahead: dto.days_ahead,
            target_start_time: dto.target_start_time,
            duration_minutes: dto.duration,
            timezone,
            preferred_courts: dto.preferred_courts,
            fallback_time_range: dto.fallback_time_range,
            scoring_weights,
            time_preferences: dto.time_preferences,
            fallback_strategy,
            retry: RetryConfig {
                max_attempts: dto.retry.max_retries,
                initial_delay_ms: dto.retry.initial_delay,
                max_delay_ms: dto.retry.max_delay,
                backoff_multiplier: dto.retry.backoff_multiplier,
                jitter_ratio: dto.retry.jitter_ratio,
            },
            circuit_breaker: CircuitBreakerConfig {
                enabled: dto.circuit_breaker.enabled,
                failure_threshold: dto.circuit_breaker.failure_threshold,
                open_timeout_ms: dto.circuit_breaker.open_timeout_ms,
                success_threshold: dto.circuit_breaker.success_threshold,
                reset_on_success: dto.circuit_breaker.reset_on_success,
            },
            selector_cache: SelectorCacheConfig { enabled: dto.selector_cache.enabled, max_size: dto.selector_cache.max_size, ttl_ms: dto.selector_cache.ttl_ms },
            success_detection: SuccessDetectionSettings {
                network_timeout_ms: dto.success_detection.network_timeout,
                dom_timeout_ms: dto.success_detection.dom_timeout,
                url_check_interval_ms: dto.success_detection.url_check_interval,
                enable_network: dto.success_detection.enable_network,
                enable_dom: dto.success_detection.enable_dom,
                enable_url: dto.success_detection.enable_url,
                enable_text_fallback: dto.success_detection.enable_text_fallback,
                success_keywords: dto.success_detection.success_keywords,
            },
            pattern_learning: PatternLearningConfig {
                enabled: dto.pattern_learning.enabled,
                retention_days: dto.pattern_learning.retention_days,
                min_attempts: dto.pattern_learning.min_attempts,
                store_path: dto.pattern_learning.store_path.map(PathBuf::from),
            },
            dry_run: dto.dry_run,
            confirm_live: dto.confirm_live,
            output_dir: PathBuf::from(dto.output_dir),
        })
    }

    /// Calendar URL for the given date, with the significant query
    /// parameters the venue page expects.
    pub fn calendar_url(&self, date: &str) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!("{}{}sport=squash&date={}", self.base_url, separator, date)
    }
}

/// Environment overrides for the operational knobs, applied on the raw DTO
/// before validation.
pub fn apply_env_overrides(dto: &mut BookingConfigDto) {
    if let Ok(value) = std::env::var("BOOKING_DRY_RUN") {
        match value.as_str() {
            "1" | "true" | "yes" => dto.dry_run = true,
            "0" | "false" | "no" => dto.dry_run = false,
            other => log::warn!("Ignoring unparseable BOOKING_DRY_RUN value '{}'.", other),
        }
    }

    if let Ok(value) = std::env::var("BOOKING_DAYS_AHEAD") {
        match value.parse::<i64>() {
            Ok(days) => dto.days_ahead = days,
            Err(_) => log::warn!("Ignoring unparseable BOOKING_DAYS_AHEAD value '{}'.", value),
        }
    }

    if let Ok(value) = std::env::var("BOOKING_TARGET_START_TIME") {
        dto.target_start_time = value;
    }

    if let Ok(value) = std::env::var("BOOKING_BASE_URL") {
        dto.base_url = value;
    }

    if let Ok(value) = std::env::var("BOOKING_OUTPUT_DIR") {
        dto.output_dir = value;
    }
}
