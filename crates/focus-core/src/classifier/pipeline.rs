//! Cache → remote → keyword fallback orchestration.

use std::sync::Arc;

use super::category::{is_protected_selector, is_watch_page, SiteCategory};
use super::keyword::KeywordClassifier;
use super::remote::{
    self, ClassifierError, ElementVerdict, PageVerdict, RemoteClassifier, ELEMENT_MAX_TOKENS,
    PAGE_MAX_TOKENS,
};
use super::{Decision, DecisionSource, PageElement, PageSnapshot};
use crate::cache::{CacheTier, RelevanceCache};
use crate::notifications::{Notice, UserNotifier};
use crate::scheduler::RequestScheduler;
use crate::settings::{Settings, SettingsSource};

/// Reason attached to fail-open decisions on bad input or cache state.
const INVARIANT_VIOLATION: &str = "invariant-violation";

/// Decides what to block on a page for the current task.
///
/// Lookup order: always-allow list, relevance cache, remote classifier (via
/// the shared [`RequestScheduler`]), keyword fallback. Every freshly computed
/// decision is written to both cache keys before it is returned.
pub struct ClassificationPipeline {
    settings: Arc<dyn SettingsSource>,
    remote: Arc<dyn RemoteClassifier>,
    scheduler: Arc<RequestScheduler>,
    notifier: Arc<dyn UserNotifier>,
    cache: RelevanceCache,
    keywords: KeywordClassifier,
}

impl std::fmt::Debug for ClassificationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationPipeline")
            .field("scheduler", &self.scheduler)
            .field("cache_len", &self.cache.len())
            .field("keywords", &self.keywords)
            .finish()
    }
}

impl ClassificationPipeline {
    /// Creates a pipeline with a default cache and keyword classifier.
    pub fn new(
        settings: Arc<dyn SettingsSource>,
        remote: Arc<dyn RemoteClassifier>,
        scheduler: Arc<RequestScheduler>,
        notifier: Arc<dyn UserNotifier>,
    ) -> Self {
        Self {
            settings,
            remote,
            scheduler,
            notifier,
            cache: RelevanceCache::default(),
            keywords: KeywordClassifier::default(),
        }
    }

    /// Replaces the cache.
    pub fn with_cache(mut self, cache: RelevanceCache) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the keyword classifier.
    pub fn with_keywords(mut self, keywords: KeywordClassifier) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn cache(&self) -> &RelevanceCache {
        &self.cache
    }

    /// Drops all cached decisions.
    pub fn clear_cache(&self) {
        self.cache.clear();
        tracing::debug!("Relevance cache cleared");
    }

    /// Classifies `page` against `task`.
    ///
    /// Never fails: every error path degrades to a decision.
    pub async fn classify(&self, page: &PageSnapshot, task: &str) -> Decision {
        let task = task.trim();
        if task.is_empty() {
            tracing::warn!(url = %page.url, "Classification requested without a task");
            return Decision::allow(INVARIANT_VIOLATION, 50).with_source(DecisionSource::Degraded);
        }
        let Some(domain) = page.domain() else {
            tracing::warn!(url = %page.url, "Classification requested for a page without a host");
            return Decision::allow(INVARIANT_VIOLATION, 50).with_source(DecisionSource::Degraded);
        };

        let settings = self.load_settings().await;

        if settings.is_always_allowed(&domain) {
            tracing::debug!(domain = %domain, "Domain is always allowed");
            return Decision::allow("always-allow", 100).with_source(DecisionSource::AlwaysAllow);
        }

        let category = SiteCategory::detect(&page.url, &domain);

        match self.cache.lookup(&domain, task) {
            Ok(Some((entry, tier))) => {
                let cached = entry.to_decision();
                if category.is_element_mode() && cached.blocks_page() {
                    // Page-level verdicts from other pages of the domain never
                    // apply to element-mode pages.
                    tracing::debug!(domain = %domain, ?category, "Ignoring cached page block");
                } else {
                    tracing::debug!(
                        domain = %domain,
                        domain_level = tier == CacheTier::Domain,
                        "Using cached analysis"
                    );
                    return match category {
                        SiteCategory::General => cached,
                        SiteCategory::Search | SiteCategory::RichMedia => {
                            element_blocks_only(cached, page)
                        }
                    };
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Cache invariant violated, allowing page");
                return Decision::allow(INVARIANT_VIOLATION, 50)
                    .with_source(DecisionSource::Degraded);
            }
        }

        tracing::debug!(domain = %domain, ?category, "Analyzing page");

        let decision = match category {
            SiteCategory::Search => self.classify_search(&settings, page, task).await,
            SiteCategory::RichMedia => self.classify_media(&settings, page, task).await,
            SiteCategory::General => self.classify_general(&settings, page, &domain, task).await,
        };

        self.cache.store(&domain, task, &decision);
        tracing::info!(
            domain = %domain,
            should_block = decision.should_block,
            selectors = decision.selectors_to_block.len(),
            score = decision.score,
            reason = %decision.reason,
            source = ?decision.source,
            "Page classified"
        );
        decision
    }

    async fn load_settings(&self) -> Settings {
        match self.settings.load().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load settings, using defaults");
                Settings::default()
            }
        }
    }

    async fn classify_search(&self, settings: &Settings, page: &PageSnapshot, task: &str) -> Decision {
        if page.elements.is_empty() {
            return Decision::allow("search-page", 70);
        }
        let decision = self
            .classify_elements(settings, page, &page.elements, task, SiteCategory::Search)
            .await;
        element_blocks_only(decision, page)
    }

    async fn classify_media(&self, settings: &Settings, page: &PageSnapshot, task: &str) -> Decision {
        let candidates: Vec<PageElement> = page
            .elements
            .iter()
            .filter(|el| !el.is_main_content)
            .cloned()
            .collect();
        if candidates.is_empty() {
            let score = if is_watch_page(&page.url) { 70 } else { 50 };
            return Decision::allow("extraction-failed", score);
        }

        let decision = self
            .classify_elements(settings, page, &candidates, task, SiteCategory::RichMedia)
            .await;
        element_blocks_only(decision, page)
    }

    async fn classify_general(
        &self,
        settings: &Settings,
        page: &PageSnapshot,
        domain: &str,
        task: &str,
    ) -> Decision {
        if page.text.trim().is_empty() {
            return Decision::allow("extraction-failed", 50);
        }
        if !settings.has_remote_classifier() {
            return self.keywords.classify_page(page, domain, task);
        }

        let prompt = remote::page_prompt(page, task);
        let verdict = match self.call_remote(settings, &prompt, PAGE_MAX_TOKENS).await {
            Ok(text) => PageVerdict::parse(&text),
            Err(e) => {
                self.notify_fallback(settings, &e);
                Err(e)
            }
        };

        match verdict {
            Ok(verdict) => verdict.into_decision(),
            Err(e) => {
                tracing::warn!(error = %e, "Page analysis failed, using keyword fallback");
                self.keywords.classify_page(page, domain, task)
            }
        }
    }

    async fn classify_elements(
        &self,
        settings: &Settings,
        page: &PageSnapshot,
        elements: &[PageElement],
        task: &str,
        category: SiteCategory,
    ) -> Decision {
        if !settings.has_remote_classifier() {
            return self.keywords.classify_elements(elements, task);
        }

        let prompt = remote::element_prompt(page, elements, task, category);
        let verdict = match self.call_remote(settings, &prompt, ELEMENT_MAX_TOKENS).await {
            Ok(text) => ElementVerdict::parse(&text),
            Err(e) => Err(e),
        };

        match verdict {
            Ok(verdict) => verdict.into_decision(),
            Err(e) => {
                tracing::warn!(error = %e, "Element analysis failed, using keyword fallback");
                self.keywords.classify_elements(elements, task)
            }
        }
    }

    /// Sends a prompt through the scheduler and returns the model text.
    async fn call_remote(
        &self,
        settings: &Settings,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, ClassifierError> {
        let remote = self.remote.as_ref();
        let response = self
            .scheduler
            .schedule(move || remote.send(settings, prompt, max_output_tokens))
            .await?;
        remote::response_text(&response.body)
    }

    fn notify_fallback(&self, settings: &Settings, error: &ClassifierError) {
        if !settings.notifications_enabled {
            return;
        }
        let notice = if error.is_rate_limited() {
            Notice::FallbackRateLimited
        } else {
            Notice::FallbackApiError
        };
        self.notifier.notify(&notice);
    }
}

/// Restricts a decision to element hiding: the page itself stays, and
/// protected or main-content selectors are dropped.
fn element_blocks_only(mut decision: Decision, page: &PageSnapshot) -> Decision {
    decision.should_block = false;
    decision.selectors_to_block.retain(|selector| {
        !is_protected_selector(selector)
            && !page
                .elements
                .iter()
                .any(|el| el.is_main_content && el.selector == *selector)
    });
    decision
}
