use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::api::pattern_dto::BookingPatternDto;
use crate::domain::clock::clock::SystemClock;
use crate::error::Result;

/// Read port used by the court scorer.
pub trait PatternQuery: Send + Sync {
    /// `(success_rate, total_attempts)` for the key, `None` if never seen.
    fn success_stats(&self, court_id: &str, time_slot: &str, day_of_week: u8) -> Option<(f64, u32)>;
}

/// Write port used by the booking state machine.
pub trait PatternUpdater: Send + Sync {
    fn record_outcome(&self, court_id: &str, time_slot: &str, day_of_week: u8, success: bool);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PatternKey {
    court_id: String,
    time_slot: String,
    day_of_week: u8,
}

#[derive(Debug, Clone, Copy, Default)]
struct PatternStats {
    successes: u32,
    attempts: u32,
    last_updated_ms: i64,
}

/// Durable success statistics keyed by (court, time slot, day of week).
///
/// Updates are buffered in memory and written by [`flush`](Self::flush) as
/// one atomic temp-file-plus-rename. Persistence is best effort: an IO
/// failure logs a warning and never fails a booking.
pub struct PatternStore {
    enabled: bool,
    path: Option<PathBuf>,
    retention_days: i64,
    clock: Arc<dyn SystemClock>,
    entries: RwLock<HashMap<PatternKey, PatternStats>>,
    dirty: RwLock<bool>,
}

impl std::fmt::Debug for PatternStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternStore").field("enabled", &self.enabled).field("path", &self.path).field("entries", &self.entries.read().unwrap().len()).finish()
    }
}

impl PatternStore {
    pub fn new(enabled: bool, path: Option<PathBuf>, retention_days: i64, clock: Arc<dyn SystemClock>) -> PatternStore {
        PatternStore { enabled, path, retention_days, clock, entries: RwLock::new(HashMap::new()), dirty: RwLock::new(false) }
    }

    /// Loads the persisted pattern file if it exists, dropping entries older
    /// than the retention window.
    pub fn load(&self) {
        if !self.enabled {
            return;
        }
        let Some(path) = &self.path else {
            return;
        };
        if !path.exists() {
            return;
        }

        let loaded: Result<Vec<BookingPatternDto>> = fs::read_to_string(path)
            .map_err(Into::into)
            .and_then(|raw| serde_json::from_str::<Vec<BookingPatternDto>>(&raw).map_err(Into::into));

        match loaded {
            Ok(patterns) => {
                let total = patterns.len();
                self.import(patterns);
                let pruned = self.prune_stale();
                log::info!("Loaded {} booking pattern(s) from '{}', pruned {} stale.", total, path.display(), pruned);
                *self.dirty.write().unwrap() = pruned > 0;
            }
            Err(error) => {
                log::warn!("Could not load booking patterns from '{}': {}", path.display(), error);
            }
        }
    }

    /// Writes buffered updates to disk. Best effort.
    pub fn flush(&self) {
        if !self.enabled || !*self.dirty.read().unwrap() {
            return;
        }
        let Some(path) = &self.path else {
            return;
        };

        if let Err(error) = self.write_atomically(path) {
            log::warn!("Could not persist booking patterns to '{}': {}", path.display(), error);
            return;
        }

        *self.dirty.write().unwrap() = false;
        log::debug!("Persisted {} booking pattern(s) to '{}'.", self.entries.read().unwrap().len(), path.display());
    }

    fn write_atomically(&self, path: &PathBuf) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.export())?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Snapshot of all entries, sorted for a stable on-disk order.
    pub fn export(&self) -> Vec<BookingPatternDto> {
        let entries = self.entries.read().unwrap();
        let mut patterns: Vec<BookingPatternDto> = entries
            .iter()
            .map(|(key, stats)| BookingPatternDto {
                court_id: key.court_id.clone(),
                time_slot: key.time_slot.clone(),
                day_of_week: key.day_of_week,
                successes: stats.successes,
                attempts: stats.attempts,
                success_rate: if stats.attempts > 0 { stats.successes as f64 / stats.attempts as f64 } else { 0.0 },
                last_updated: stats.last_updated_ms,
            })
            .collect();

        patterns.sort_by(|a, b| (&a.court_id, &a.time_slot, a.day_of_week).cmp(&(&b.court_id, &b.time_slot, b.day_of_week)));
        patterns
    }

    /// Replaces the in-memory map with the given list.
    pub fn import(&self, patterns: Vec<BookingPatternDto>) {
        let mut entries = self.entries.write().unwrap();
        entries.clear();
        for dto in patterns {
            entries.insert(
                PatternKey { court_id: dto.court_id, time_slot: dto.time_slot, day_of_week: dto.day_of_week },
                PatternStats { successes: dto.successes, attempts: dto.attempts, last_updated_ms: dto.last_updated },
            );
        }
    }

    fn prune_stale(&self) -> usize {
        let cutoff = self.clock.now_ms() - self.retention_days * 24 * 60 * 60 * 1_000;
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, stats| stats.last_updated_ms >= cutoff);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

impl PatternQuery for PatternStore {
    fn success_stats(&self, court_id: &str, time_slot: &str, day_of_week: u8) -> Option<(f64, u32)> {
        if !self.enabled {
            return None;
        }

        let entries = self.entries.read().unwrap();
        let key = PatternKey { court_id: court_id.to_string(), time_slot: time_slot.to_string(), day_of_week };
        entries.get(&key).filter(|stats| stats.attempts > 0).map(|stats| (stats.successes as f64 / stats.attempts as f64, stats.attempts))
    }
}

impl PatternUpdater for PatternStore {
    fn record_outcome(&self, court_id: &str, time_slot: &str, day_of_week: u8, success: bool) {
        if !self.enabled {
            return;
        }

        let now = self.clock.now_ms();
        {
            let mut entries = self.entries.write().unwrap();
            let key = PatternKey { court_id: court_id.to_string(), time_slot: time_slot.to_string(), day_of_week };
            let stats = entries.entry(key).or_default();
            stats.attempts += 1;
            if success {
                stats.successes += 1;
            }
            stats.last_updated_ms = now;
        }
        *self.dirty.write().unwrap() = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::clock_mock::MockClock;

    fn store_at(path: Option<PathBuf>, now_ms: i64) -> PatternStore {
        PatternStore::new(true, path, 90, Arc::new(MockClock::new(now_ms)))
    }

    #[test]
    fn test_record_and_query() {
        let store = store_at(None, 1_000);

        store.record_outcome("1", "14:00", 0, true);
        store.record_outcome("1", "14:00", 0, true);
        store.record_outcome("1", "14:00", 0, false);

        let (rate, attempts) = store.success_stats("1", "14:00", 0).unwrap();
        assert_eq!(attempts, 3);
        assert!((rate - 2.0 / 3.0).abs() < 1e-9);
        assert!(store.success_stats("2", "14:00", 0).is_none());
    }

    #[test]
    fn test_export_import_round_trip() {
        let store = store_at(None, 1_000);
        store.record_outcome("1", "14:00", 0, true);
        store.record_outcome("3", "18:30", 5, false);

        let exported = store.export();
        let other = store_at(None, 1_000);
        other.import(exported.clone());

        assert_eq!(other.export(), exported);
    }

    #[test]
    fn test_flush_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");

        let store = store_at(Some(path.clone()), 1_000);
        store.record_outcome("1", "14:00", 2, true);
        store.flush();
        assert!(path.exists());

        let reloaded = store_at(Some(path), 1_000);
        reloaded.load();
        assert_eq!(reloaded.export(), store.export());
    }

    #[test]
    fn test_stale_entries_are_pruned_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");

        let old = store_at(Some(path.clone()), 1_000);
        old.record_outcome("1", "14:00", 2, true);
        old.flush();

        // 91 days later, the entry is past the 90-day retention window.
        let later = 1_000 + 91 * 24 * 60 * 60 * 1_000;
        let reloaded = store_at(Some(path), later);
        reloaded.load();
        assert!(reloaded.is_empty());
    }

    #[test]
    fn test_write_failure_is_best_effort() {
        let store = store_at(Some(PathBuf::from("/nonexistent-dir/patterns.json")), 1_000);
        store.record_outcome("1", "14:00", 2, true);
        // Must warn, not panic or fail.
        store.flush();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_disabled_store_is_inert() {
        let store = PatternStore::new(false, None, 90, Arc::new(MockClock::new(0)));
        store.record_outcome("1", "14:00", 2, true);
        assert!(store.success_stats("1", "14:00", 2).is_none());
        assert!(store.is_empty());
    }
}
