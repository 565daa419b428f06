pub mod fallback_engine;
pub mod selector_cache;
pub mod tiers;
