use std::sync::Arc;

use crate::domain::clock::clock::SystemClock;
use crate::domain::driver::page_driver::{ElementHandle, PageDriver};
use crate::domain::selector::selector_cache::{CacheKey, CacheMetrics, SelectorCache, page_url_hash};
use crate::domain::selector::tiers::{self, SelectorCategory, SelectorTier};
use crate::error::{Error, Result};

/// Query parameters whose change means the page now shows different slot
/// data, so selectors proven on the old view are no longer trusted.
const SIGNIFICANT_PARAMS: [&str; 4] = ["sport", "venue", "date", "court"];

#[derive(Debug, Clone)]
pub struct SelectorMatch {
    pub selector: Option<String>,
    pub tier: Option<u8>,
    pub elements: Vec<ElementHandle>,
    pub from_cache: bool,
    pub duration_ms: u64,
}

impl SelectorMatch {
    pub fn success(&self) -> bool {
        !self.elements.is_empty()
    }

    pub fn elements_found(&self) -> usize {
        self.elements.len()
    }

    /// Converts a no-match into the retryable [`Error::ElementNotFound`].
    pub fn require(self, category: SelectorCategory) -> Result<SelectorMatch> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::element_not_found(category.as_str(), "all selector tiers exhausted without a match"))
        }
    }
}

/// Tries prioritized selector tiers against the live page, remembering the
/// last selector that worked per (page, category) in the LRU+TTL cache.
#[derive(Debug)]
pub struct SelectorFallbackEngine {
    cache: SelectorCache,
    cache_enabled: bool,
    last_url: Option<String>,
    clock: Arc<dyn SystemClock>,
}

impl SelectorFallbackEngine {
    pub fn new(cache_enabled: bool, cache_max_size: usize, cache_ttl_ms: i64, clock: Arc<dyn SystemClock>) -> SelectorFallbackEngine {
        SelectorFallbackEngine { cache: SelectorCache::new(cache_max_size, cache_ttl_ms, clock.clone()), cache_enabled, last_url: None, clock }
    }

    pub async fn find(&mut self, driver: &dyn PageDriver, category: SelectorCategory) -> Result<SelectorMatch> {
        self.run(driver, category, None, tiers::tiers_for(category), false).await
    }

    /// Like [`find`](Self::find), but additionally blocks on visibility with
    /// each tier's timeout before probing it.
    pub async fn find_and_wait(&mut self, driver: &dyn PageDriver, category: SelectorCategory) -> Result<SelectorMatch> {
        self.run(driver, category, None, tiers::tiers_for(category), true).await
    }

    pub async fn find_specific_slot(&mut self, driver: &dyn PageDriver, date: &str, time: &str, court: &str) -> Result<SelectorMatch> {
        let slot_tiers = tiers::specific_slot_tiers(date, time, court)?;
        let specific_id = tiers::specific_slot_id(date, time, court)?;
        self.run(driver, SelectorCategory::SpecificSlot, Some(specific_id), &slot_tiers, false).await
    }

    pub fn invalidate_category(&mut self, category: SelectorCategory) -> usize {
        self.cache.invalidate_category(category)
    }

    pub fn cache_metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }

    /// Seeds the cache with a known selector, as a warm start or in tests.
    pub fn prime_cache(&mut self, url: &str, category: SelectorCategory, specific_id: Option<String>, selector: &str, tier: u8) {
        let key = CacheKey::new(page_url_hash(url), category, specific_id);
        self.cache.set(key, selector, tier, 0.0, 0);
    }

    async fn run(
        &mut self,
        driver: &dyn PageDriver,
        category: SelectorCategory,
        specific_id: Option<String>,
        tiers: &[SelectorTier],
        wait: bool,
    ) -> Result<SelectorMatch> {
        let started = self.clock.now_ms();

        let url = driver.page_url().await?;
        self.note_page_url(&url);
        let key = CacheKey::new(page_url_hash(&url), category, specific_id);

        if self.cache_enabled {
            if let Some(entry) = self.cache.get(&key) {
                let probe_started = self.clock.now_ms();
                let elements = driver.locate_all(&entry.selector).await.unwrap_or_default();

                if !elements.is_empty() {
                    self.cache.mark_hit(&key, (self.clock.now_ms() - probe_started) as f64, elements.len());
                    return Ok(SelectorMatch {
                        selector: Some(entry.selector),
                        tier: Some(entry.tier),
                        elements,
                        from_cache: true,
                        duration_ms: (self.clock.now_ms() - started) as u64,
                    });
                }

                log::debug!("Cached selector '{}' for category '{}' no longer matches anything, invalidating.", entry.selector, category);
                self.cache.mark_miss();
                self.cache.invalidate(&key);
            } else {
                self.cache.mark_miss();
            }
        }

        for tier in tiers {
            for selector in &tier.selectors {
                if wait && driver.wait_for_visible(selector, tier.timeout_ms).await.is_err() {
                    continue;
                }

                let probe_started = self.clock.now_ms();
                let elements = driver.locate_all(selector).await?;

                if !elements.is_empty() {
                    let response_time = (self.clock.now_ms() - probe_started) as f64;
                    if self.cache_enabled {
                        self.cache.set(key.clone(), selector, tier.priority, response_time, elements.len());
                    }
                    log::debug!("Category '{}' matched {} element(s) via tier {} selector '{}'.", category, elements.len(), tier.priority, selector);
                    return Ok(SelectorMatch {
                        selector: Some(selector.clone()),
                        tier: Some(tier.priority),
                        elements,
                        from_cache: false,
                        duration_ms: (self.clock.now_ms() - started) as u64,
                    });
                }
            }
        }

        log::warn!("All {} tier(s) for category '{}' matched nothing.", tiers.len(), category);
        Ok(SelectorMatch { selector: None, tier: None, elements: Vec::new(), from_cache: false, duration_ms: (self.clock.now_ms() - started) as u64 })
    }

    /// Drops the previous page's entries when a navigation crossed a
    /// significant-parameter boundary (same venue page, different slot data).
    fn note_page_url(&mut self, url: &str) {
        if let Some(last) = self.last_url.as_deref() {
            if last != url && significant_params(last) != significant_params(url) {
                let dropped = self.cache.invalidate_for_page(&page_url_hash(last));
                if dropped > 0 {
                    log::debug!("Page parameters changed, dropped {} cached selector(s) for the previous view.", dropped);
                }
            }
        }
        self.last_url = Some(url.to_string());
    }
}

fn significant_params(url: &str) -> Vec<(String, String)> {
    let query = url.split_once('?').map(|(_, rest)| rest).unwrap_or("");
    let query = query.split('#').next().unwrap_or("");

    let mut params: Vec<(String, String)> = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(name, _)| SIGNIFICANT_PARAMS.contains(name))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

    params.sort();
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::clock_mock::MockClock;
    use crate::domain::driver::driver_mock::MockPageDriver;

    fn engine() -> SelectorFallbackEngine {
        SelectorFallbackEngine::new(true, 32, 60_000, Arc::new(MockClock::new(0)))
    }

    #[tokio::test]
    async fn test_tier_one_wins_and_is_cached() {
        let driver = MockPageDriver::new();
        driver.set_url("https://example.org/cal?date=2025-11-23");
        driver.register_element("div", &[("id", "booking-calendar-container")]);

        let mut engine = engine();
        let found = engine.find(&driver, SelectorCategory::Calendar).await.unwrap();
        assert!(found.success());
        assert_eq!(found.tier, Some(1));
        assert!(!found.from_cache);

        // Second query resolves through the cache.
        let again = engine.find(&driver, SelectorCategory::Calendar).await.unwrap();
        assert!(again.from_cache);
        assert_eq!(engine.cache_metrics().hits, 1);
        assert_eq!(engine.cache_metrics().misses, 1);
    }

    #[tokio::test]
    async fn test_falls_through_to_lower_tier() {
        let driver = MockPageDriver::new();
        driver.set_url("https://example.org/cal");
        driver.register_element("div", &[("class", "calendar")]);

        let mut engine = engine();
        let found = engine.find(&driver, SelectorCategory::Calendar).await.unwrap();
        assert!(found.success());
        assert_eq!(found.tier, Some(2));
        assert_eq!(found.selector.as_deref(), Some(".calendar"));
    }

    #[tokio::test]
    async fn test_dead_cached_selector_is_invalidated_then_tiers_recover() {
        let driver = MockPageDriver::new();
        driver.set_url("https://example.org/cal");
        driver.register_element("td", &[("class", "slot-free")]);

        let mut engine = engine();
        engine.prime_cache("https://example.org/cal", SelectorCategory::FreeSlot, None, "td.retired-selector", 1);

        let before = engine.cache_metrics();
        let found = engine.find(&driver, SelectorCategory::FreeSlot).await.unwrap();
        let after = engine.cache_metrics();

        assert!(found.success());
        assert_eq!(found.tier, Some(2));
        assert_eq!(found.selector.as_deref(), Some("td.slot-free"));
        assert!(!found.from_cache);
        assert_eq!(after.misses, before.misses + 1);
        assert_eq!(after.hits, before.hits);
    }

    #[tokio::test]
    async fn test_total_failure_reports_no_tier() {
        let driver = MockPageDriver::new();
        driver.set_url("https://example.org/cal");

        let mut engine = engine();
        let found = engine.find(&driver, SelectorCategory::FreeSlot).await.unwrap();
        assert!(!found.success());
        assert_eq!(found.tier, None);
        assert_eq!(found.elements_found(), 0);
        assert!(found.require(SelectorCategory::FreeSlot).is_err());
    }

    #[tokio::test]
    async fn test_significant_param_change_drops_page_entries() {
        let driver = MockPageDriver::new();
        driver.set_url("https://example.org/cal?sport=squash&date=2025-11-23");
        driver.register_element("div", &[("id", "booking-calendar-container")]);

        let mut engine = engine();
        engine.find(&driver, SelectorCategory::Calendar).await.unwrap();

        // Same base URL, different date: the cached calendar entry is stale.
        driver.set_url("https://example.org/cal?sport=squash&date=2025-11-24");
        let found = engine.find(&driver, SelectorCategory::Calendar).await.unwrap();
        assert!(!found.from_cache);
    }

    #[tokio::test]
    async fn test_specific_slot_lookup() {
        let driver = MockPageDriver::new();
        driver.set_url("https://example.org/cal");
        driver.register_calendar_cell("2025-11-23", "1400", "1", "free");

        let mut engine = engine();
        let found = engine.find_specific_slot(&driver, "2025-11-23", "14:00", "1").await.unwrap();
        assert!(found.success());
        assert_eq!(found.tier, Some(1));
    }
}
