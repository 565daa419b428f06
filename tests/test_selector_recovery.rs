use squash_booking::domain::clock::clock_mock::MockClock;
use squash_booking::domain::driver::driver_mock::MockPageDriver;
use squash_booking::domain::selector::fallback_engine::SelectorFallbackEngine;
use squash_booking::domain::selector::tiers::SelectorCategory;

use std::sync::Arc;

const PAGE_URL: &str = "https://example.org/sb/center?sport=squash&date=2025-11-23";

fn engine() -> SelectorFallbackEngine {
    SelectorFallbackEngine::new(true, 64, 60_000, Arc::new(MockClock::new(0)))
}

/// A selector that worked on the last visit stopped matching after a site
/// change; the engine invalidates it, falls through the tiers, and leaves
/// the cache pointing at the new selector.
#[tokio::test]
async fn test_dead_cached_selector_recovers_through_tiers() {
    let driver = MockPageDriver::new();
    driver.set_url(PAGE_URL);
    // The page only exposes the tier-2 shape of free cells.
    driver.register_element("td", &[("class", "slot-free"), ("data-court", "1")]);

    let mut engine = engine();
    engine.prime_cache(PAGE_URL, SelectorCategory::FreeSlot, None, "td[data-state=\"free\"]", 1);

    let before = engine.cache_metrics();
    let found = engine.find(&driver, SelectorCategory::FreeSlot).await.unwrap();
    let after = engine.cache_metrics();

    assert!(found.success());
    assert!(!found.from_cache);
    assert_eq!(found.tier, Some(2));
    assert_eq!(found.selector.as_deref(), Some("td.slot-free"));

    assert_eq!(after.misses, before.misses + 1);
    assert_eq!(after.hits, before.hits);

    // The recovered selector is the new cached entry; the next query is a
    // straight cache hit.
    let again = engine.find(&driver, SelectorCategory::FreeSlot).await.unwrap();
    assert!(again.from_cache);
    assert_eq!(engine.cache_metrics().hits, after.hits + 1);
}

/// Navigating to another date on the same venue page drops that page's
/// cached selectors instead of trusting them against new slot data.
#[tokio::test]
async fn test_date_change_invalidates_the_page_cache() {
    let driver = MockPageDriver::new();
    driver.set_url(PAGE_URL);
    driver.register_element("td", &[("data-state", "free")]);

    let mut engine = engine();
    let first = engine.find(&driver, SelectorCategory::FreeSlot).await.unwrap();
    assert!(first.success());

    driver.set_url("https://example.org/sb/center?sport=squash&date=2025-11-24");
    let second = engine.find(&driver, SelectorCategory::FreeSlot).await.unwrap();

    assert!(second.success());
    assert!(!second.from_cache);
}
