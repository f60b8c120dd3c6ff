//! Translation caching for repeated natural-language questions
//!
//! Uses moka for thread-safe concurrent caching with TTL-based expiration.
//! Only successful translations are stored.

use moka::sync::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Question → validated SQL cache with TTL
pub struct TranslationCache {
    cache: Cache<String, String>,
    /// Cache hit count
    hits: AtomicU64,
    /// Cache miss count
    misses: AtomicU64,
    ttl: Duration,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::with_config(500, Duration::from_secs(300))
    }

    pub fn with_config(max_entries: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            ttl,
        }
    }

    pub fn get(&self, question: &str) -> Option<String> {
        let key = normalize_question(question);
        if let Some(sql) = self.cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(sql)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn put(&self, question: &str, sql: String) {
        self.cache.insert(normalize_question(question), sql);
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            entry_count: self.cache.entry_count(),
            ttl_secs: self.ttl.as_secs(),
        }
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
    /// Approximate; moka applies inserts lazily
    pub entry_count: u64,
    pub ttl_secs: u64,
}

/// Case- and whitespace-insensitive key; trailing `?`/`.` ignored
fn normalize_question(question: &str) -> String {
    question
        .trim()
        .trim_end_matches(['?', '.', '!'])
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
