use chrono::Datelike;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::booking::analytics::BookingAnalytics;
use crate::domain::booking::booking_result::{BookingResult, BookingSuccessResult};
use crate::domain::booking::cookie_consent::CookieConsentHandler;
use crate::domain::booking::dry_run_validator::DryRunValidator;
use crate::domain::booking::success_detector::SuccessDetector;
use crate::domain::calendar::calendar_matrix::CalendarMatrix;
use crate::domain::calendar::cell::SlotPair;
use crate::domain::calendar::matrix_extractor::MatrixExtractor;
use crate::domain::clock::clock::SystemClock;
use crate::domain::config::BookingConfig;
use crate::domain::context::RequestContext;
use crate::domain::datetime::date_time_calculator::DateTimeCalculator;
use crate::domain::driver::page_driver::{ElementRef, PageDriver};
use crate::domain::pattern::pattern_store::{PatternQuery, PatternUpdater};
use crate::domain::resilience::circuit_breaker::CircuitBreaker;
use crate::domain::resilience::retry_engine::{AttemptDetail, RetryContext, RetryEngine, RetryPolicy, RetryResult};
use crate::domain::selection::court_scorer::CourtScorer;
use crate::domain::selection::pair_selector::{PairSelection, SlotPairSelector};
use crate::domain::selection::time_slot_generator::TimeSlotGenerator;
use crate::domain::selector::fallback_engine::{SelectorFallbackEngine, SelectorMatch};
use crate::domain::selector::selector_cache::CacheMetrics;
use crate::domain::selector::tiers::SelectorCategory;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingState {
    Init,
    Navigated,
    MatrixLoaded,
    PairSelected,
    Acted,
    Confirmed,
    Failed,
}

impl std::fmt::Display for BookingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BookingState::Init => "INIT",
            BookingState::Navigated => "NAVIGATED",
            BookingState::MatrixLoaded => "MATRIX_LOADED",
            BookingState::PairSelected => "PAIR_SELECTED",
            BookingState::Acted => "ACTED",
            BookingState::Confirmed => "CONFIRMED",
            BookingState::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// Orchestrates one booking run: navigate → search → select → act →
/// confirm. Every page action runs through the retry engine with a
/// step-specific policy; the dry-run gate sits directly on the commit
/// click and nowhere else.
pub struct BookingStateMachine {
    driver: Arc<dyn PageDriver>,
    config: BookingConfig,
    clock: Arc<dyn SystemClock>,
    engine: Arc<Mutex<SelectorFallbackEngine>>,
    retry: RetryEngine,
    calculator: Arc<DateTimeCalculator>,
    extractor: Arc<MatrixExtractor>,
    pair_selector: SlotPairSelector,
    detector: SuccessDetector,
    validator: DryRunValidator,
    consent: CookieConsentHandler,
    pattern_updater: Arc<dyn PatternUpdater>,
    analytics: Arc<BookingAnalytics>,
    context: RequestContext,
    state: BookingState,
    selected: Option<SlotPair>,
    day_of_week: u8,
    retry_attempts: u32,
    retry_details: Vec<AttemptDetail>,
    circuit_breaker_tripped: bool,
}

impl BookingStateMachine {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        config: BookingConfig,
        clock: Arc<dyn SystemClock>,
        pattern_query: Arc<dyn PatternQuery>,
        pattern_updater: Arc<dyn PatternUpdater>,
        analytics: Arc<BookingAnalytics>,
    ) -> BookingStateMachine {
        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone(), clock.clone()));
        let retry = RetryEngine::new(breaker, clock.clone());

        let calculator = Arc::new(DateTimeCalculator::new(config.timezone, clock.clone()));
        let engine = Arc::new(Mutex::new(SelectorFallbackEngine::new(
            config.selector_cache.enabled,
            config.selector_cache.max_size,
            config.selector_cache.ttl_ms,
            clock.clone(),
        )));

        let scorer = CourtScorer::new(config.scoring_weights, config.pattern_learning.min_attempts, pattern_query);
        let generator = TimeSlotGenerator::new(calculator.clone(), clock.clone());
        let pair_selector = SlotPairSelector::new(
            scorer,
            generator,
            config.time_preferences.clone(),
            config.preferred_courts.clone(),
            config.fallback_time_range,
            config.fallback_strategy,
        );

        let detector = SuccessDetector::new(config.success_detection.clone(), clock.clone(), analytics.clone());

        BookingStateMachine {
            driver,
            clock: clock.clone(),
            engine,
            retry,
            calculator,
            extractor: Arc::new(MatrixExtractor::new(clock)),
            pair_selector,
            detector,
            validator: DryRunValidator::new(),
            consent: CookieConsentHandler::new(),
            pattern_updater,
            analytics,
            context: RequestContext::new("booking"),
            state: BookingState::Init,
            selected: None,
            day_of_week: 0,
            retry_attempts: 0,
            retry_details: Vec::new(),
            circuit_breaker_tripped: false,
            config,
        }
    }

    pub fn state(&self) -> BookingState {
        self.state
    }

    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        self.retry.breaker().clone()
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub async fn cache_metrics(&self) -> CacheMetrics {
        self.engine.lock().await.cache_metrics()
    }

    pub async fn run(&mut self) -> BookingResult {
        // Fresh per-run state; the circuit breaker deliberately survives
        // from one run to the next.
        self.context = RequestContext::new("booking");
        self.state = BookingState::Init;
        self.selected = None;
        self.retry_attempts = 0;
        self.retry_details.clear();
        self.circuit_breaker_tripped = false;

        log::info!("{} Starting booking run (dry run: {}).", self.context.tag(), self.config.dry_run);

        let outcome = self.run_to_completion().await;
        let timestamp_ms = self.clock.now_ms();

        let result = match outcome {
            Ok((pair, confirmation)) if confirmation.success => {
                self.transition(BookingState::Confirmed);
                self.record_patterns(&pair, true);
                BookingResult {
                    success: true,
                    booked_pair: Some(pair),
                    confirmation: Some(confirmation),
                    error: None,
                    retry_attempts: self.retry_attempts,
                    retry_details: self.retry_details.clone(),
                    circuit_breaker_tripped: self.circuit_breaker_tripped,
                    timestamp_ms,
                    correlation_id: self.context.correlation_id.clone(),
                }
            }
            Ok((pair, confirmation)) => {
                self.transition(BookingState::Failed);
                self.record_patterns(&pair, false);
                BookingResult {
                    success: false,
                    booked_pair: None,
                    confirmation: Some(confirmation),
                    error: Some("Commit was issued but no detection strategy confirmed the booking.".to_string()),
                    retry_attempts: self.retry_attempts,
                    retry_details: self.retry_details.clone(),
                    circuit_breaker_tripped: self.circuit_breaker_tripped,
                    timestamp_ms,
                    correlation_id: self.context.correlation_id.clone(),
                }
            }
            Err(error) => {
                log::error!("{} Booking run failed in state {}: {}", self.context.tag(), self.state, error);
                self.transition(BookingState::Failed);

                // A tripped breaker says nothing about this court/time, so
                // the pattern statistics only count real outcomes.
                if !matches!(error, Error::CircuitOpen) {
                    if let Some(pair) = self.selected.clone() {
                        self.record_patterns(&pair, false);
                    }
                }

                self.capture_failure_screenshot().await;

                BookingResult {
                    success: false,
                    booked_pair: None,
                    confirmation: None,
                    error: Some(error.to_string()),
                    retry_attempts: self.retry_attempts,
                    retry_details: self.retry_details.clone(),
                    circuit_breaker_tripped: self.circuit_breaker_tripped,
                    timestamp_ms,
                    correlation_id: self.context.correlation_id.clone(),
                }
            }
        };

        self.analytics.record_run(&result);
        log::info!("{} Booking run finished: success={} state={}.", self.context.tag(), result.success, self.state);
        result
    }

    async fn run_to_completion(&mut self) -> Result<(SlotPair, BookingSuccessResult)> {
        let today = self.calculator.booking_date(0);
        let target_date = self.calculator.booking_date(self.config.days_ahead);
        self.validator.validate_preflight(&self.config, target_date, today)?;

        let date = target_date.format("%Y-%m-%d").to_string();
        self.day_of_week = target_date.weekday().num_days_from_sunday() as u8;

        self.navigate(&date).await?;
        let matrix = self.load_matrix().await?;
        let selection = self.select_pair(&matrix, &date)?;
        self.act_on_pair(&selection, &date).await?;

        let confirmation = self.confirm().await?;
        self.validator.validate_result(&confirmation, self.config.dry_run)?;

        Ok((selection.pair, confirmation))
    }

    async fn navigate(&mut self, date: &str) -> Result<()> {
        let url = self.config.calendar_url(date);
        log::info!("{} Navigating to '{}'.", self.context.tag(), url);

        let context = RetryContext::new("navigate-to-calendar", RetryPolicy::navigation(&self.config.retry));
        let driver = self.driver.clone();
        let target = url.clone();

        let result = self
            .retry
            .execute(&context, || {
                let driver = driver.clone();
                let target = target.clone();
                async move { driver.navigate(&target).await }
            })
            .await;
        self.absorb(result)?;

        self.consent.dismiss_if_present(&*self.driver).await;
        self.transition(BookingState::Navigated);
        Ok(())
    }

    async fn load_matrix(&mut self) -> Result<CalendarMatrix> {
        let context = RetryContext::new("load-calendar-matrix", RetryPolicy::search(&self.config.retry));
        let driver = self.driver.clone();
        let engine = self.engine.clone();
        let extractor = self.extractor.clone();

        let result = self
            .retry
            .execute(&context, || {
                let driver = driver.clone();
                let engine = engine.clone();
                let extractor = extractor.clone();
                async move {
                    let mut engine = engine.lock().await;
                    engine.find_and_wait(&*driver, SelectorCategory::Calendar).await?.require(SelectorCategory::Calendar)?;
                    extractor.extract(&*driver, &mut engine).await
                }
            })
            .await;

        let matrix = self.absorb(result)?;
        self.transition(BookingState::MatrixLoaded);
        Ok(matrix)
    }

    fn select_pair(&mut self, matrix: &CalendarMatrix, date: &str) -> Result<PairSelection> {
        let selection = self.pair_selector.select(matrix, date, &self.config.target_start_time, self.day_of_week)?;
        self.selected = Some(selection.pair.clone());
        self.transition(BookingState::PairSelected);
        Ok(selection)
    }

    async fn act_on_pair(&mut self, selection: &PairSelection, date: &str) -> Result<()> {
        for slot in [&selection.pair.slot1, &selection.pair.slot2] {
            let context = RetryContext::new(format!("select-slot-{}", slot.start_time), RetryPolicy::action(&self.config.retry));
            let driver = self.driver.clone();
            let engine = self.engine.clone();
            let date = date.to_string();
            let time = slot.start_time.clone();
            let court = slot.court_id.clone();

            let result = self
                .retry
                .execute(&context, || {
                    let driver = driver.clone();
                    let engine = engine.clone();
                    let date = date.clone();
                    let time = time.clone();
                    let court = court.clone();
                    async move {
                        let mut engine = engine.lock().await;
                        let matched = engine.find_specific_slot(&*driver, &date, &time, &court).await?.require(SelectorCategory::SpecificSlot)?;
                        driver.click(ElementRef::Handle(matched.elements[0])).await
                    }
                })
                .await;
            self.absorb(result)?;
        }

        self.transition(BookingState::Acted);
        Ok(())
    }

    async fn confirm(&mut self) -> Result<BookingSuccessResult> {
        // Exercise the checkout selector path in every mode.
        let context = RetryContext::new("locate-checkout", RetryPolicy::action(&self.config.retry));
        let driver = self.driver.clone();
        let engine = self.engine.clone();

        let result = self
            .retry
            .execute(&context, || {
                let driver = driver.clone();
                let engine = engine.clone();
                async move { engine.lock().await.find(&*driver, SelectorCategory::Checkout).await?.require(SelectorCategory::Checkout) }
            })
            .await;
        let checkout: SelectorMatch = self.absorb(result)?;

        if self.config.dry_run {
            // The commit click is the single write action of the whole run;
            // a dry run stops exactly here.
            log::info!("{} Dry run: commit click suppressed, synthesizing confirmation.", self.context.tag());
            return Ok(BookingSuccessResult::dry_run(self.clock.now_ms()));
        }

        // Arm the response listener for exactly this commit attempt; it is
        // dropped when detection finishes.
        let mut responses = self.driver.subscribe_responses();

        let commit_handle = checkout.elements[0];
        let context = RetryContext::new("commit-booking", RetryPolicy::confirmation(&self.config.retry));
        let driver = self.driver.clone();

        let result = self
            .retry
            .execute(&context, || {
                let driver = driver.clone();
                async move { driver.click(ElementRef::Handle(commit_handle)).await }
            })
            .await;
        self.absorb(result)?;

        Ok(self.detector.detect(&*self.driver, &mut responses).await)
    }

    fn absorb<T>(&mut self, result: RetryResult<T>) -> Result<T> {
        self.retry_attempts += result.attempts;
        self.retry_details.extend(result.details);
        self.circuit_breaker_tripped |= result.circuit_breaker_tripped;
        result.outcome
    }

    fn transition(&mut self, next: BookingState) {
        log::debug!("{} State {} -> {}.", self.context.tag(), self.state, next);
        self.state = next;
    }

    fn record_patterns(&self, pair: &SlotPair, success: bool) {
        let mode = if self.config.dry_run { " (dry-run sample)" } else { "" };
        log::debug!("{} Recording pattern outcome success={}{} for court '{}'.", self.context.tag(), success, mode, pair.court_id);

        self.pattern_updater.record_outcome(&pair.court_id, &pair.slot1.start_time, self.day_of_week, success);
        self.pattern_updater.record_outcome(&pair.court_id, &pair.slot2.start_time, self.day_of_week, success);
    }

    async fn capture_failure_screenshot(&self) {
        let path = self.config.output_dir.join(format!("failure-{}.png", &self.context.correlation_id[..8.min(self.context.correlation_id.len())]));
        if std::fs::create_dir_all(&self.config.output_dir).is_err() {
            return;
        }
        if let Err(error) = self.driver.screenshot(&path).await {
            log::debug!("{} Could not capture failure screenshot: {}", self.context.tag(), error);
        }
    }
}
