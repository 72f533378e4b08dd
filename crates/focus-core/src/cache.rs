//! Two-tier relevance cache.
//!
//! Classification results are stored under two keys:
//!
//! - `"<domain>:<task>"`: the session-specific result (full TTL)
//! - `"domain:<domain>"`: a task-agnostic fallback (half TTL)
//!
//! The store is bounded. Once the entry cap is exceeded the earliest
//! *inserted* key is evicted (FIFO); reads never refresh an entry's position.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::classifier::{Decision, DecisionSource};

/// Default time-to-live for session-specific entries (60 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Default maximum number of stored keys.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Prefix of the task-agnostic key.
const DOMAIN_KEY_PREFIX: &str = "domain:";

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of keys before FIFO eviction.
    pub max_entries: usize,
    /// TTL of `"<domain>:<task>"` keys.
    pub ttl: Duration,
    /// TTL of `"domain:<domain>"` keys.
    pub domain_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: DEFAULT_TTL,
            domain_ttl: DEFAULT_TTL / 2,
        }
    }
}

/// A cached classification result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub selectors_to_block: Vec<String>,
    pub should_block: bool,
    /// Relevance score, 0 to 100.
    pub score: u8,
    pub reason: String,
    pub has_related_content: bool,
    /// When the entry was written.
    #[serde(skip)]
    pub timestamp: Instant,
}

impl CacheEntry {
    /// Builds an entry from a fresh decision, stamped now.
    pub fn from_decision(decision: &Decision) -> Self {
        Self {
            selectors_to_block: decision.selectors_to_block.clone(),
            should_block: decision.should_block,
            score: decision.score.min(100),
            reason: decision.reason.clone(),
            has_related_content: decision.has_related_content,
            timestamp: Instant::now(),
        }
    }

    /// Converts the entry back into a decision served from cache.
    pub fn to_decision(&self) -> Decision {
        Decision {
            selectors_to_block: self.selectors_to_block.clone(),
            should_block: self.should_block,
            score: self.score,
            reason: self.reason.clone(),
            has_related_content: self.has_related_content,
            source: DecisionSource::Cache,
        }
    }

    fn is_valid(&self) -> bool {
        self.score <= 100
    }
}

/// Which key satisfied a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    /// The `"<domain>:<task>"` key.
    Task,
    /// The `"domain:<domain>"` key.
    Domain,
}

/// Error raised for entries that violate cache invariants.
#[derive(Debug, thiserror::Error)]
#[error("corrupt cache entry for key {0}")]
pub struct CacheCorruption(pub String);

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

/// Bounded, TTL'd relevance cache.
#[derive(Debug)]
pub struct RelevanceCache {
    inner: Mutex<CacheInner>,
    config: CacheConfig,
}

impl Default for RelevanceCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl RelevanceCache {
    /// Creates an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            config,
        }
    }

    /// Session-specific key for a domain and task.
    pub fn task_key(domain: &str, task: &str) -> String {
        format!("{domain}:{task}")
    }

    /// Task-agnostic key for a domain.
    pub fn domain_key(domain: &str) -> String {
        format!("{DOMAIN_KEY_PREFIX}{domain}")
    }

    /// TTL of a key tier.
    pub fn ttl(&self, tier: CacheTier) -> Duration {
        match tier {
            CacheTier::Task => self.config.ttl,
            CacheTier::Domain => self.config.domain_ttl,
        }
    }

    /// Returns the entry for `key` if present and younger than `ttl`.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<CacheEntry> {
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .filter(|e| e.timestamp.elapsed() < ttl)
            .cloned()
    }

    /// Stores `entry` under `key`, evicting the oldest inserted key when the
    /// cap is exceeded.
    pub fn put(&self, key: impl Into<String>, entry: CacheEntry) {
        let key = key.into();
        let mut inner = self.inner.lock();
        if inner.entries.insert(key.clone(), entry).is_none() {
            inner.order.push_back(key);
        }
        while inner.entries.len() > self.config.max_entries {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
            tracing::trace!(key = %oldest, "Evicted cache entry");
        }
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Number of stored keys, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a page: the task key first, then the domain key.
    ///
    /// Returns an error if the hit violates an entry invariant.
    pub fn lookup(
        &self,
        domain: &str,
        task: &str,
    ) -> Result<Option<(CacheEntry, CacheTier)>, CacheCorruption> {
        for (key, tier) in [
            (Self::task_key(domain, task), CacheTier::Task),
            (Self::domain_key(domain), CacheTier::Domain),
        ] {
            if let Some(entry) = self.get(&key, self.ttl(tier)) {
                if !entry.is_valid() {
                    return Err(CacheCorruption(key));
                }
                return Ok(Some((entry, tier)));
            }
        }
        Ok(None)
    }

    /// Writes a fresh decision under both keys.
    pub fn store(&self, domain: &str, task: &str, decision: &Decision) {
        let entry = CacheEntry::from_decision(decision);
        self.put(Self::task_key(domain, task), entry.clone());
        self.put(Self::domain_key(domain), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(reason: &str) -> CacheEntry {
        CacheEntry {
            selectors_to_block: vec!["#sidebar".into()],
            should_block: false,
            score: 40,
            reason: reason.into(),
            has_related_content: true,
            timestamp: Instant::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn round_trip_within_ttl() {
        let cache = RelevanceCache::default();
        let e = entry("relevant");
        cache.put("example.com:rust", e.clone());
        tokio::time::advance(Duration::from_secs(59 * 60)).await;
        assert_eq!(cache.get("example.com:rust", DEFAULT_TTL), Some(e));
    }

    #[tokio::test(start_paused = true)]
    async fn miss_after_ttl() {
        let cache = RelevanceCache::default();
        cache.put("example.com:rust", entry("relevant"));
        tokio::time::advance(DEFAULT_TTL + Duration::from_millis(1)).await;
        assert_eq!(cache.get("example.com:rust", DEFAULT_TTL), None);
    }

    #[tokio::test(start_paused = true)]
    async fn domain_key_uses_half_ttl() {
        let cache = RelevanceCache::default();
        cache.put(RelevanceCache::domain_key("example.com"), entry("x"));
        cache.put(RelevanceCache::task_key("example.com", "rust"), entry("x"));
        tokio::time::advance(Duration::from_secs(31 * 60)).await;
        assert!(cache.get("domain:example.com", cache.ttl(CacheTier::Domain)).is_none());
        assert!(cache.get("example.com:rust", DEFAULT_TTL).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn host_named_domain_keeps_task_ttl() {
        let cache = RelevanceCache::default();
        cache.put(RelevanceCache::task_key("domain", "rust"), entry("intranet"));
        tokio::time::advance(Duration::from_secs(45 * 60)).await;

        let (hit, tier) = cache.lookup("domain", "rust").unwrap().unwrap();
        assert_eq!(tier, CacheTier::Task);
        assert_eq!(hit.reason, "intranet");
    }

    #[tokio::test]
    async fn evicts_earliest_inserted() {
        let cache = RelevanceCache::new(CacheConfig {
            max_entries: 3,
            ..Default::default()
        });
        for key in ["a", "b", "c"] {
            cache.put(key, entry(key));
        }
        // Reading "a" must not protect it.
        assert!(cache.get("a", DEFAULT_TTL).is_some());
        cache.put("d", entry("d"));

        assert_eq!(cache.len(), 3);
        assert!(cache.get("a", DEFAULT_TTL).is_none());
        for key in ["b", "c", "d"] {
            assert!(cache.get(key, DEFAULT_TTL).is_some(), "{key} should survive");
        }
    }

    #[tokio::test]
    async fn overwrite_keeps_insertion_position() {
        let cache = RelevanceCache::new(CacheConfig {
            max_entries: 2,
            ..Default::default()
        });
        cache.put("a", entry("a1"));
        cache.put("b", entry("b"));
        cache.put("a", entry("a2"));
        cache.put("c", entry("c"));
        assert!(cache.get("a", DEFAULT_TTL).is_none());
        assert_eq!(cache.get("b", DEFAULT_TTL).unwrap().reason, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_falls_back_to_domain_key() {
        let cache = RelevanceCache::default();
        cache.put(RelevanceCache::domain_key("news.example"), entry("domain"));

        let (hit, tier) = cache.lookup("news.example", "rust").unwrap().unwrap();
        assert_eq!(tier, CacheTier::Domain);
        assert_eq!(hit.reason, "domain");
        assert!(cache.lookup("other.example", "rust").unwrap().is_none());
    }

    #[tokio::test]
    async fn store_writes_both_keys() {
        let cache = RelevanceCache::default();
        let decision = Decision::allow("all-relevant", 90);
        cache.store("docs.rs", "rust traits", &decision);

        assert_eq!(cache.len(), 2);
        let (hit, tier) = cache.lookup("docs.rs", "rust traits").unwrap().unwrap();
        assert_eq!(tier, CacheTier::Task);
        assert_eq!(hit.to_decision().source, DecisionSource::Cache);
        assert!(cache.get("domain:docs.rs", cache.ttl(CacheTier::Domain)).is_some());
    }

    #[tokio::test]
    async fn corrupt_entry_is_reported() {
        let cache = RelevanceCache::default();
        let mut bad = entry("bad");
        bad.score = 150;
        cache.put("x.com:t", bad);
        assert!(cache.lookup("x.com", "t").is_err());
    }

    #[tokio::test]
    async fn clear_empties_store() {
        let cache = RelevanceCache::default();
        cache.put("a", entry("a"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
