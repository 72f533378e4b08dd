//! Navigation routing.
//!
//! The [`FocusEngine`] receives tab events, applies the always-block and
//! anti-tampering guards, runs the classification pipeline during a session,
//! and dispatches the result only if the tab is still on the page that was
//! analyzed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::classifier::{ClassificationPipeline, Decision, PageSnapshot};
use crate::dispatch::{DispatchTarget, TabDispatcher, TabId, TabMessage};
use crate::domain;
use crate::network_rules::{BlockRule, NetworkRuleSync, RuleSyncError};
use crate::session::SessionManager;
use crate::settings::SettingsSource;

/// Outcome of a navigation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum NavigationVerdict {
    /// Subframe or browser-internal page.
    Ignored,
    /// The page may load; analysis follows once content is available.
    Proceed,
    /// The page is blocked before analysis.
    Blocked { reason: String },
}

/// Coordinates sessions, rules, and classification for tab events.
pub struct FocusEngine {
    sessions: SessionManager,
    pipeline: Arc<ClassificationPipeline>,
    rules: Arc<NetworkRuleSync>,
    settings: Arc<dyn SettingsSource>,
    dispatcher: Arc<dyn TabDispatcher>,
    /// Per-tab navigation counter.
    navigations: Mutex<HashMap<TabId, u64>>,
}

impl std::fmt::Debug for FocusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusEngine")
            .field("sessions", &self.sessions)
            .field("tabs", &self.navigations.lock().len())
            .finish()
    }
}

impl FocusEngine {
    pub fn new(
        sessions: SessionManager,
        pipeline: Arc<ClassificationPipeline>,
        rules: Arc<NetworkRuleSync>,
        settings: Arc<dyn SettingsSource>,
        dispatcher: Arc<dyn TabDispatcher>,
    ) -> Self {
        Self {
            sessions,
            pipeline,
            rules,
            settings,
            dispatcher,
            navigations: Mutex::new(HashMap::new()),
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn pipeline(&self) -> &ClassificationPipeline {
        &self.pipeline
    }

    /// Handles a navigation commit.
    pub async fn check_navigation(&self, tab: TabId, url: &str, main_frame: bool) -> NavigationVerdict {
        if !main_frame {
            return NavigationVerdict::Ignored;
        }
        self.bump_navigation(tab);

        let session_active = self.sessions.is_active();
        if domain::is_internal_page(url) {
            if session_active && domain::is_extension_management_page(url) {
                tracing::warn!(tab, "Extension management page opened during a session");
                return self.block(tab, "extensions-page-blocked");
            }
            return NavigationVerdict::Ignored;
        }

        if self.is_always_blocked(url).await {
            tracing::info!(tab, url, "Navigation to always-blocked host");
            return self.block(tab, "always-block");
        }

        NavigationVerdict::Proceed
    }

    /// Classifies a loaded page and dispatches the decision to its tab.
    ///
    /// Returns `None` when there is no session or the page is internal.
    pub async fn analyze_page(&self, tab: TabId, page: &PageSnapshot) -> Option<Decision> {
        let session = self.sessions.current()?;
        if domain::is_internal_page(&page.url) {
            return None;
        }
        let seq = self.navigation_seq(tab);

        let decision = self.pipeline.classify(page, &session.task_description).await;

        let same_session = self
            .sessions
            .current()
            .is_some_and(|s| s.start_time == session.start_time);
        if !same_session {
            tracing::debug!(tab, "Session ended during analysis, dropping result");
            return Some(decision);
        }
        if self.navigation_seq(tab) != seq {
            tracing::debug!(tab, "Tab navigated during analysis, dropping result");
            return Some(decision);
        }

        let message = TabMessage::for_decision(&decision);
        tracing::debug!(tab, action = message.action(), reason = %decision.reason, "Applying decision");
        self.dispatcher.dispatch(DispatchTarget::Tab(tab), message);
        Some(decision)
    }

    /// Forgets a closed tab.
    pub fn close_tab(&self, tab: TabId) {
        self.navigations.lock().remove(&tab);
    }

    /// Re-applies the always-block list from the current settings.
    pub async fn sync_rules(&self) -> Result<Vec<BlockRule>, RuleSyncError> {
        let settings = self.settings.load().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load settings, using defaults");
            Default::default()
        });
        self.rules.apply_settings(&settings).await
    }

    /// Installed block rules.
    pub async fn rules(&self) -> Result<Vec<BlockRule>, RuleSyncError> {
        self.rules.rules().await
    }

    async fn is_always_blocked(&self, url: &str) -> bool {
        if let Some(host) = domain::normalize(url) {
            match self.settings.load().await {
                Ok(settings) if settings.is_always_blocked(&host) => return true,
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Failed to load settings"),
            }
        }
        match self.rules.matching_rule(url).await {
            Ok(rule) => rule.is_some(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read block rules");
                false
            }
        }
    }

    fn block(&self, tab: TabId, reason: &str) -> NavigationVerdict {
        self.dispatcher.dispatch(
            DispatchTarget::Tab(tab),
            TabMessage::BlockPage {
                reason: reason.to_string(),
                score: 0,
            },
        );
        NavigationVerdict::Blocked {
            reason: reason.to_string(),
        }
    }

    fn bump_navigation(&self, tab: TabId) {
        *self.navigations.lock().entry(tab).or_insert(0) += 1;
    }

    fn navigation_seq(&self, tab: TabId) -> u64 {
        self.navigations.lock().get(&tab).copied().unwrap_or(0)
    }
}
