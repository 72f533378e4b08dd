//! Network-level blocklist synchronization.
//!
//! The always-block list is compiled into ID-addressed rules that the browser
//! enforces before any page loads. The synchronizer owns the ID range
//! [`RULE_ID_MIN`]..=[`RULE_ID_MAX`]: every sync removes whatever is installed
//! in that range and adds the freshly compiled set in one atomic update.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain;
use crate::settings::Settings;

/// First rule ID owned by the synchronizer.
pub const RULE_ID_MIN: u32 = 1000;

/// Last rule ID owned by the synchronizer.
pub const RULE_ID_MAX: u32 = 1999;

/// Request types a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
}

/// A single compiled block rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRule {
    pub id: u32,
    pub hostname: String,
    pub regex_filter: String,
    pub priority: u32,
    pub resource_types: Vec<ResourceType>,
}

impl BlockRule {
    /// Builds the rule blocking `hostname` and all of its subdomains.
    pub fn for_hostname(id: u32, hostname: &str) -> Self {
        Self {
            id,
            hostname: hostname.to_string(),
            regex_filter: Self::regex_for(hostname),
            priority: 1,
            resource_types: vec![ResourceType::MainFrame, ResourceType::SubFrame],
        }
    }

    /// URL filter for `hostname`: any scheme, any subdomain, host boundary.
    pub fn regex_for(hostname: &str) -> String {
        format!(r"^[^:]+://([^/]*\.)?{}(/|$)", regex::escape(hostname))
    }

    /// Returns true if `url` is blocked by this rule.
    pub fn matches(&self, url: &str) -> bool {
        match Regex::new(&self.regex_filter) {
            Ok(re) => re.is_match(&url.to_ascii_lowercase()),
            Err(e) => {
                tracing::warn!(id = self.id, error = %e, "Invalid rule filter");
                false
            }
        }
    }

    /// Returns true if the ID is in the synchronizer's range.
    pub fn is_managed(&self) -> bool {
        (RULE_ID_MIN..=RULE_ID_MAX).contains(&self.id)
    }
}

/// Error reported by a rule store.
#[derive(Debug, Clone, thiserror::Error)]
#[error("rule store error: {0}")]
pub struct RuleStoreError(pub String);

/// Rule synchronization errors.
#[derive(Debug, thiserror::Error)]
pub enum RuleSyncError {
    #[error(transparent)]
    Store(#[from] RuleStoreError),

    /// An entry could not be parsed as a hostname.
    #[error("invalid hostname: {0}")]
    InvalidHostname(String),

    /// More hostnames than the ID range holds.
    #[error("{count} hostnames exceed the rule capacity of {capacity}")]
    Capacity { count: usize, capacity: usize },
}

/// Installed network rules (the browser's dynamic rule set).
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Lists every installed rule.
    async fn installed_rules(&self) -> Result<Vec<BlockRule>, RuleStoreError>;

    /// Removes `remove_ids` and adds `add_rules` as one atomic update.
    async fn update_rules(
        &self,
        remove_ids: &[u32],
        add_rules: &[BlockRule],
    ) -> Result<(), RuleStoreError>;
}

/// Rule store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<BTreeMap<u32, BlockRule>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn installed_rules(&self) -> Result<Vec<BlockRule>, RuleStoreError> {
        Ok(self.rules.read().values().cloned().collect())
    }

    async fn update_rules(
        &self,
        remove_ids: &[u32],
        add_rules: &[BlockRule],
    ) -> Result<(), RuleStoreError> {
        let mut rules = self.rules.write();
        let mut next = rules.clone();
        for id in remove_ids {
            next.remove(id);
        }
        for rule in add_rules {
            if next.insert(rule.id, rule.clone()).is_some() {
                return Err(RuleStoreError(format!("duplicate rule id {}", rule.id)));
            }
        }
        *rules = next;
        Ok(())
    }
}

/// Compiles hostnames into rules with sequential IDs.
///
/// Entries are normalized; empty entries and duplicates are dropped.
pub fn compile_rules<S: AsRef<str>>(hostnames: &[S]) -> Result<Vec<BlockRule>, RuleSyncError> {
    let mut unique: Vec<String> = Vec::with_capacity(hostnames.len());
    for raw in hostnames {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            continue;
        }
        let host =
            domain::normalize(raw).ok_or_else(|| RuleSyncError::InvalidHostname(raw.to_string()))?;
        if !unique.contains(&host) {
            unique.push(host);
        }
    }

    let capacity = (RULE_ID_MAX - RULE_ID_MIN + 1) as usize;
    if unique.len() > capacity {
        return Err(RuleSyncError::Capacity {
            count: unique.len(),
            capacity,
        });
    }

    Ok(unique
        .iter()
        .zip(RULE_ID_MIN..)
        .map(|(host, id)| BlockRule::for_hostname(id, host))
        .collect())
}

/// Keeps the store's managed ID range equal to the always-block list.
pub struct NetworkRuleSync {
    store: Arc<dyn RuleStore>,
}

impl std::fmt::Debug for NetworkRuleSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkRuleSync").finish_non_exhaustive()
    }
}

impl NetworkRuleSync {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self { store }
    }

    /// Replaces the managed rules with one rule per hostname.
    pub async fn apply_blocked_hostnames<S: AsRef<str> + Sync>(
        &self,
        hostnames: &[S],
    ) -> Result<Vec<BlockRule>, RuleSyncError> {
        let rules = compile_rules(hostnames)?;
        self.replace_managed(&rules).await?;
        tracing::info!(count = rules.len(), "Applied network block rules");
        Ok(rules)
    }

    /// Applies the always-block list from `settings`.
    pub async fn apply_settings(&self, settings: &Settings) -> Result<Vec<BlockRule>, RuleSyncError> {
        let hosts = settings.blocked_hosts();
        self.apply_blocked_hostnames(hosts.as_slice()).await
    }

    /// Removes every managed rule.
    pub async fn clear(&self) -> Result<(), RuleSyncError> {
        self.replace_managed(&[]).await?;
        tracing::info!("Cleared network block rules");
        Ok(())
    }

    /// Installed rules in the managed range.
    pub async fn rules(&self) -> Result<Vec<BlockRule>, RuleSyncError> {
        let installed = self.store.installed_rules().await?;
        Ok(installed.into_iter().filter(BlockRule::is_managed).collect())
    }

    /// Returns the first managed rule that blocks `url`.
    pub async fn matching_rule(&self, url: &str) -> Result<Option<BlockRule>, RuleSyncError> {
        Ok(self.rules().await?.into_iter().find(|r| r.matches(url)))
    }

    async fn replace_managed(&self, add: &[BlockRule]) -> Result<(), RuleSyncError> {
        let remove_ids: Vec<u32> = self.rules().await?.iter().map(|r| r.id).collect();
        self.store
            .update_rules(&remove_ids, add)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to update network rules");
                RuleSyncError::Store(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync() -> (NetworkRuleSync, Arc<InMemoryRuleStore>) {
        let store = Arc::new(InMemoryRuleStore::new());
        (NetworkRuleSync::new(store.clone()), store)
    }

    #[test]
    fn rule_matches_host_and_subdomains() {
        let rule = BlockRule::for_hostname(RULE_ID_MIN, "reddit.com");
        assert!(rule.matches("https://reddit.com"));
        assert!(rule.matches("https://www.reddit.com/r/rust"));
        assert!(rule.matches("http://old.reddit.com/"));
        assert!(!rule.matches("https://notreddit.com/"));
        assert!(!rule.matches("https://reddit.com.evil.io/"));
        assert!(!rule.matches("https://example.com/?u=reddit.com"));
    }

    #[test]
    fn regex_escapes_dots() {
        assert_eq!(
            BlockRule::regex_for("a.com"),
            r"^[^:]+://([^/]*\.)?a\.com(/|$)"
        );
        assert!(!BlockRule::for_hostname(1000, "a.com").matches("https://abcom/"));
    }

    #[test]
    fn compile_assigns_sequential_ids_and_dedupes() {
        let rules = compile_rules(&["reddit.com", "", "https://www.reddit.com", "x.com"]).unwrap();
        let summary: Vec<(u32, &str)> = rules.iter().map(|r| (r.id, r.hostname.as_str())).collect();
        assert_eq!(summary, vec![(1000, "reddit.com"), (1001, "x.com")]);
        assert!(rules.iter().all(|r| r.priority == 1));
    }

    #[test]
    fn compile_rejects_garbage() {
        assert!(matches!(
            compile_rules(&["not a host"]),
            Err(RuleSyncError::InvalidHostname(_))
        ));
    }

    #[test]
    fn compile_enforces_capacity() {
        let hosts: Vec<String> = (0..1001).map(|i| format!("h{i}.example")).collect();
        assert!(matches!(
            compile_rules(&hosts),
            Err(RuleSyncError::Capacity { count: 1001, .. })
        ));
    }

    #[tokio::test]
    async fn apply_is_idempotent() {
        let (sync, _) = sync();
        let list = vec!["reddit.com".to_string(), "twitter.com".to_string()];
        sync.apply_blocked_hostnames(&list).await.unwrap();
        let first = sync.rules().await.unwrap();
        sync.apply_blocked_hostnames(&list).await.unwrap();
        assert_eq!(sync.rules().await.unwrap(), first);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn apply_replaces_previous_set() {
        let (sync, _) = sync();
        sync.apply_blocked_hostnames(&["a.com", "b.com", "c.com"])
            .await
            .unwrap();
        sync.apply_blocked_hostnames(&["d.com"]).await.unwrap();
        let rules = sync.rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].hostname, "d.com");
        assert_eq!(rules[0].id, RULE_ID_MIN);
    }

    #[tokio::test]
    async fn foreign_rules_are_untouched() {
        let (sync, store) = sync();
        let foreign = BlockRule::for_hostname(5, "ads.example");
        store.update_rules(&[], &[foreign.clone()]).await.unwrap();

        sync.apply_blocked_hostnames(&["reddit.com"]).await.unwrap();
        sync.clear().await.unwrap();

        assert_eq!(store.installed_rules().await.unwrap(), vec![foreign]);
    }

    #[tokio::test]
    async fn empty_list_clears_range() {
        let (sync, _) = sync();
        sync.apply_blocked_hostnames(&["reddit.com"]).await.unwrap();
        sync.apply_blocked_hostnames::<&str>(&[]).await.unwrap();
        assert!(sync.rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn matching_rule_finds_blocked_url() {
        let (sync, _) = sync();
        sync.apply_blocked_hostnames(&["reddit.com"]).await.unwrap();
        let hit = sync
            .matching_rule("https://www.reddit.com/r/all")
            .await
            .unwrap();
        assert_eq!(hit.map(|r| r.hostname), Some("reddit.com".to_string()));
        assert!(sync
            .matching_rule("https://example.com/")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn store_update_is_all_or_nothing() {
        let store = InMemoryRuleStore::new();
        store
            .update_rules(&[], &[BlockRule::for_hostname(1000, "a.com")])
            .await
            .unwrap();
        let dup = [
            BlockRule::for_hostname(1001, "b.com"),
            BlockRule::for_hostname(1001, "c.com"),
        ];
        assert!(store.update_rules(&[1000], &dup).await.is_err());
        let installed = store.installed_rules().await.unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].hostname, "a.com");
    }
}
