use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::clock::clock::SystemClock;
use crate::domain::selector::tiers::SelectorCategory;

/// First 16 hex characters of the SHA-256 over the URL with query and
/// fragment stripped. Two URLs that only differ in query parameters share a
/// hash; the fallback engine handles significant-parameter changes itself.
pub fn page_url_hash(url: &str) -> String {
    let base = url.split(['?', '#']).next().unwrap_or(url);
    let digest = Sha256::digest(base.as_bytes());
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub page_hash: String,
    pub category: SelectorCategory,
    pub specific_id: Option<String>,
}

impl CacheKey {
    pub fn new(page_hash: impl Into<String>, category: SelectorCategory, specific_id: Option<String>) -> CacheKey {
        CacheKey { page_hash: page_hash.into(), category, specific_id }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorCacheEntry {
    pub selector: String,
    pub tier: u8,
    pub page_url_hash: String,
    pub hit_count: u64,
    pub last_used_ms: i64,
    pub avg_response_time_ms: f64,
    pub elements_found: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetrics {
    pub total_queries: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub lru_evictions: u64,
    pub ttl_evictions: u64,
    pub memory_estimate_mb: f64,
}

/// Last-known-good selectors keyed by (page, category, optional id).
///
/// Entries expire after `ttl_ms` of disuse; at capacity the entry with the
/// lowest access counter is evicted. Hit and miss accounting is driven by
/// the fallback engine, which knows whether a cached selector actually
/// matched anything on the live page.
#[derive(Debug)]
pub struct SelectorCache {
    entries: HashMap<CacheKey, SelectorCacheEntry>,
    max_size: usize,
    ttl_ms: i64,
    clock: Arc<dyn SystemClock>,
    total_queries: u64,
    hits: u64,
    misses: u64,
    lru_evictions: u64,
    ttl_evictions: u64,
}

impl SelectorCache {
    pub fn new(max_size: usize, ttl_ms: i64, clock: Arc<dyn SystemClock>) -> SelectorCache {
        SelectorCache {
            entries: HashMap::new(),
            max_size: max_size.max(1),
            ttl_ms,
            clock,
            total_queries: 0,
            hits: 0,
            misses: 0,
            lru_evictions: 0,
            ttl_evictions: 0,
        }
    }

    /// Returns the live entry for `key`, evicting it first if its TTL has
    /// lapsed. Does not touch hit/miss counters.
    pub fn get(&mut self, key: &CacheKey) -> Option<SelectorCacheEntry> {
        let now = self.clock.now_ms();

        if let Some(entry) = self.entries.get(key) {
            if now - entry.last_used_ms > self.ttl_ms {
                self.entries.remove(key);
                self.ttl_evictions += 1;
                return None;
            }
            return Some(entry.clone());
        }

        None
    }

    pub fn set(&mut self, key: CacheKey, selector: &str, tier: u8, response_time_ms: f64, elements_found: usize) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.evict_coldest();
        }

        let now = self.clock.now_ms();
        self.entries.insert(
            key.clone(),
            SelectorCacheEntry {
                selector: selector.to_string(),
                tier,
                page_url_hash: key.page_hash,
                hit_count: 0,
                last_used_ms: now,
                avg_response_time_ms: response_time_ms,
                elements_found,
            },
        );
    }

    /// Records a cache query whose cached selector matched on the page.
    pub fn mark_hit(&mut self, key: &CacheKey, response_time_ms: f64, elements_found: usize) {
        self.total_queries += 1;
        self.hits += 1;

        let now = self.clock.now_ms();
        if let Some(entry) = self.entries.get_mut(key) {
            entry.hit_count += 1;
            entry.last_used_ms = now;
            entry.elements_found = elements_found;
            // Rolling mean over all observed responses for this entry.
            let n = entry.hit_count as f64;
            entry.avg_response_time_ms += (response_time_ms - entry.avg_response_time_ms) / n;
        }
    }

    /// Records a cache query that found no usable entry, either because the
    /// key was absent or because the cached selector no longer matched.
    pub fn mark_miss(&mut self) {
        self.total_queries += 1;
        self.misses += 1;
    }

    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn invalidate_for_page(&mut self, page_hash: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.page_hash != page_hash);
        before - self.entries.len()
    }

    pub fn invalidate_category(&mut self, category: SelectorCategory) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.category != category);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metrics(&self) -> CacheMetrics {
        let hit_rate = if self.total_queries > 0 { self.hits as f64 / self.total_queries as f64 } else { 0.0 };

        // Rough per-entry footprint: key strings plus the entry struct.
        let bytes: usize = self.entries.iter().map(|(key, entry)| 96 + key.page_hash.len() + entry.selector.len()).sum();

        CacheMetrics {
            total_queries: self.total_queries,
            hits: self.hits,
            misses: self.misses,
            hit_rate,
            lru_evictions: self.lru_evictions,
            ttl_evictions: self.ttl_evictions,
            memory_estimate_mb: bytes as f64 / (1024.0 * 1024.0),
        }
    }

    fn evict_coldest(&mut self) {
        let coldest = self.entries.iter().min_by_key(|(_, entry)| (entry.hit_count, entry.last_used_ms)).map(|(key, _)| key.clone());

        if let Some(key) = coldest {
            self.entries.remove(&key);
            self.lru_evictions += 1;
        }
    }
}
