use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant, timeout_at};

use crate::domain::booking::analytics::BookingAnalytics;
use crate::domain::booking::booking_result::{BookingSuccessResult, DetectionMethod};
use crate::domain::clock::clock::SystemClock;
use crate::domain::config::SuccessDetectionSettings;
use crate::domain::driver::page_driver::{PageDriver, PageResponse};

const BOOKING_URL_KEYWORDS: [&str; 8] = ["booking", "confirm", "reservation", "checkout", "purchase", "complete", "finalize", "payment/success"];

/// Checked in declaration order; id-bearing keys win over the bare flag.
const CONFIRMATION_KEYS: [&str; 6] = ["booking_id", "bookingId", "confirmation_number", "confirmation", "reservation_id", "order_id"];

const SENSITIVE_KEY_FRAGMENTS: [&str; 7] = ["card", "token", "cvv", "password", "secret", "authorization", "iban"];

/// Selector plus the attribute carrying the confirmation id; `None` means
/// the element text is the id.
const DOM_CONFIRMATION_SELECTORS: [(&str, Option<&str>); 6] = [
    ("[data-booking-id]", Some("data-booking-id")),
    ("[data-confirmation-number]", Some("data-confirmation-number")),
    ("[data-reservation-id]", Some("data-reservation-id")),
    (".booking-reference", None),
    (".confirmation-number", None),
    ("[data-testid=booking-confirmation]", None),
];

const URL_SUCCESS_PATTERNS: [&str; 8] =
    ["/booking-confirmed", "/confirmation", "/success", "/booking-complete", "/booking-success", "booking_success", "confirmed=true", "status=success"];

const CONFIRMATION_QUERY_PARAMS: [&str; 4] = ["booking_id", "confirmation", "id", "reference"];

const URL_POLL_BUDGET_MS: u64 = 10_000;

const TEXT_RESULT_CONTAINERS: [&str; 5] = [".booking-confirmation", ".booking-result", ".alert-success", ".message", "main"];

const DEFAULT_SUCCESS_KEYWORDS: [&str; 6] =
    ["successfully booked", "booking confirmed", "booking successful", "buchung erfolgreich", "erfolgreich gebucht", "reservierung bestätigt"];

/// Concludes whether the commit action produced a real booking.
///
/// Strategies run in fixed order, each individually time-bounded; the
/// first that reports success wins. Every strategy outcome is recorded by
/// analytics with its timing.
pub struct SuccessDetector {
    settings: SuccessDetectionSettings,
    clock: Arc<dyn SystemClock>,
    analytics: Arc<BookingAnalytics>,
}

impl std::fmt::Debug for SuccessDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuccessDetector").field("settings", &self.settings).finish()
    }
}

impl SuccessDetector {
    pub fn new(settings: SuccessDetectionSettings, clock: Arc<dyn SystemClock>, analytics: Arc<BookingAnalytics>) -> SuccessDetector {
        SuccessDetector { settings, clock, analytics }
    }

    pub async fn detect(&self, driver: &dyn PageDriver, responses: &mut broadcast::Receiver<PageResponse>) -> BookingSuccessResult {
        if self.settings.enable_network {
            if let Some(result) = self.timed(DetectionMethod::Network, self.detect_network(responses)).await {
                return result;
            }
        }

        if self.settings.enable_dom {
            if let Some(result) = self.timed(DetectionMethod::DomAttribute, self.detect_dom(driver)).await {
                return result;
            }
        }

        if self.settings.enable_url {
            if let Some(result) = self.timed(DetectionMethod::UrlPattern, self.detect_url(driver)).await {
                return result;
            }
        }

        if self.settings.enable_text_fallback {
            if let Some(result) = self.timed(DetectionMethod::TextFallback, self.detect_text(driver)).await {
                return result;
            }
        }

        log::warn!("No success-detection strategy produced a confirmation.");
        BookingSuccessResult::not_detected(self.clock.now_ms())
    }

    async fn timed<F>(&self, method: DetectionMethod, strategy: F) -> Option<BookingSuccessResult>
    where
        F: std::future::Future<Output = Option<Option<String>>>,
    {
        let started = self.clock.now_ms();
        let outcome = strategy.await;
        let duration_ms = (self.clock.now_ms() - started).max(0) as u64;

        self.analytics.record_detection(method, outcome.is_some(), duration_ms);

        match outcome {
            Some(confirmation_id) => {
                log::info!("Booking confirmed via {} (confirmation id: {:?}).", method, confirmation_id);
                Some(BookingSuccessResult::detected(method, confirmation_id, self.clock.now_ms()))
            }
            None => {
                log::debug!("Detection strategy {} found nothing.", method);
                None
            }
        }
    }

    /// Drains the pre-armed response listener until a booking response
    /// confirms, or the network timeout lapses.
    async fn detect_network(&self, responses: &mut broadcast::Receiver<PageResponse>) -> Option<Option<String>> {
        let deadline = Instant::now() + Duration::from_millis(self.settings.network_timeout_ms);

        loop {
            match timeout_at(deadline, responses.recv()).await {
                Err(_) => return None,
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    log::warn!("Response listener lagged, {} response(s) dropped.", skipped);
                    continue;
                }
                Ok(Ok(response)) => {
                    if !is_booking_url(&response.url) {
                        continue;
                    }

                    if let Some(body) = &response.body {
                        log::debug!("Booking response from '{}': {}", response.url, redact(body));
                        if let Some(confirmation_id) = confirmation_from_body(body) {
                            return Some(confirmation_id);
                        }
                    }

                    if matches!(response.status, 200 | 201) {
                        log::debug!("Booking URL '{}' answered with status {}.", response.url, response.status);
                        return Some(None);
                    }
                }
            }
        }
    }

    /// Waits for any of the known confirmation elements, splitting the DOM
    /// timeout evenly across the selectors.
    async fn detect_dom(&self, driver: &dyn PageDriver) -> Option<Option<String>> {
        let per_selector_ms = (self.settings.dom_timeout_ms / DOM_CONFIRMATION_SELECTORS.len() as u64).max(1);

        for (selector, attribute) in DOM_CONFIRMATION_SELECTORS {
            if driver.wait_for_visible(selector, per_selector_ms).await.is_err() {
                continue;
            }

            let confirmation_id = match attribute {
                Some(name) => match driver.locate_all(selector).await.ok().and_then(|handles| handles.first().copied()) {
                    Some(handle) => driver.get_attribute(handle, name).await.ok().flatten(),
                    None => None,
                },
                None => driver.text_content(selector).await.ok().flatten().map(|text| text.trim().to_string()).filter(|text| !text.is_empty()),
            };

            return Some(confirmation_id);
        }

        None
    }

    /// Polls the page URL for confirmation patterns, bounded by the 10 s
    /// budget at the configured interval.
    async fn detect_url(&self, driver: &dyn PageDriver) -> Option<Option<String>> {
        let interval = self.settings.url_check_interval_ms.max(1);
        let polls = (URL_POLL_BUDGET_MS / interval).max(1);

        for poll in 0..polls {
            if let Ok(url) = driver.page_url().await {
                let lower = url.to_lowercase();
                if URL_SUCCESS_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
                    return Some(confirmation_from_query(&url));
                }
            }

            if poll + 1 < polls {
                driver.wait_for_timeout(interval).await;
            }
        }

        None
    }

    /// Last-resort text matching; off in production setups.
    async fn detect_text(&self, driver: &dyn PageDriver) -> Option<Option<String>> {
        let keywords: Vec<String> = if self.settings.success_keywords.is_empty() {
            DEFAULT_SUCCESS_KEYWORDS.iter().map(|k| k.to_string()).collect()
        } else {
            self.settings.success_keywords.clone()
        };

        for container in TEXT_RESULT_CONTAINERS {
            let Ok(Some(text)) = driver.text_content(container).await else {
                continue;
            };

            let lower = text.to_lowercase();
            if keywords.iter().any(|keyword| lower.contains(&keyword.to_lowercase())) {
                return Some(extract_confirmation_token(&text));
            }
        }

        None
    }
}

fn is_booking_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    BOOKING_URL_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// `Some(id)` when the body confirms the booking; the inner option is the
/// confirmation id when one of the keys carries it.
fn confirmation_from_body(body: &Value) -> Option<Option<String>> {
    for key in CONFIRMATION_KEYS {
        if let Some(value) = body.get(key) {
            match value {
                Value::String(s) if !s.is_empty() => return Some(Some(s.clone())),
                Value::Number(n) => return Some(Some(n.to_string())),
                Value::Bool(true) => return Some(None),
                _ => {}
            }
        }
    }

    match body.get("success") {
        Some(value) if is_truthy(value) => Some(None),
        _ => None,
    }
}

/// Replaces values of payment-adjacent keys before anything is logged.
fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| {
                    let lower = key.to_lowercase();
                    if SENSITIVE_KEY_FRAGMENTS.iter().any(|fragment| lower.contains(fragment)) {
                        (key.clone(), Value::String("[redacted]".to_string()))
                    } else {
                        (key.clone(), redact(inner))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

fn confirmation_from_query(url: &str) -> Option<String> {
    let query = url.split_once('?').map(|(_, rest)| rest)?;
    let query = query.split('#').next().unwrap_or(query);

    for param in CONFIRMATION_QUERY_PARAMS {
        for pair in query.split('&') {
            if let Some((name, value)) = pair.split_once('=') {
                if name == param && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Scans free text for something shaped like a confirmation number.
fn extract_confirmation_token(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_ascii_alphanumeric()))
        .find(|token| token.len() >= 5 && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') && token.chars().any(|c| c.is_ascii_digit()))
        .map(|token| token.to_string())
}
