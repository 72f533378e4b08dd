//! Page relevance classification.
//!
//! The [`ClassificationPipeline`] turns a [`PageSnapshot`] and the session's
//! task into a [`Decision`]: which selectors to hide, and whether the page as
//! a whole is blocked.

mod category;
mod keyword;
mod pipeline;
mod remote;

pub use category::{is_watch_page, SiteCategory, SiteClass};
pub use keyword::{KeywordClassifier, KeywordWeights, RelevanceThresholds};
pub use pipeline::ClassificationPipeline;
pub use remote::{
    extract_json_span, ClassifierError, ElementVerdict, HttpClassifier, PageVerdict,
    RemoteClassifier, DEFAULT_REQUEST_TIMEOUT,
};

use serde::{Deserialize, Serialize};

use crate::domain;

/// Selector that stands for "the whole page".
pub const PAGE_SELECTOR: &str = "body";

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Host is on the always-allow list.
    AlwaysAllow,
    /// Served from the relevance cache.
    Cache,
    /// Remote classifier answer.
    Remote,
    /// Keyword matching after the remote path was unavailable.
    KeywordFallback,
    /// Fixed rule such as "search page without results".
    Heuristic,
    /// Inputs violated an invariant; failed open.
    Degraded,
}

/// Outcome of classifying one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// CSS selectors to hide. `["body"]` means the whole page.
    pub selectors_to_block: Vec<String>,
    pub should_block: bool,
    /// Relevance score, 0 to 100.
    pub score: u8,
    pub reason: String,
    pub has_related_content: bool,
    pub source: DecisionSource,
}

impl Decision {
    /// A decision that hides nothing.
    pub fn allow(reason: impl Into<String>, score: u8) -> Self {
        Self {
            selectors_to_block: Vec::new(),
            should_block: false,
            score: score.min(100),
            reason: reason.into(),
            has_related_content: true,
            source: DecisionSource::Heuristic,
        }
    }

    /// A decision that blocks the whole page.
    pub fn block_page(reason: impl Into<String>, score: u8) -> Self {
        Self {
            selectors_to_block: vec![PAGE_SELECTOR.to_string()],
            should_block: true,
            score: score.min(100),
            reason: reason.into(),
            has_related_content: false,
            source: DecisionSource::Heuristic,
        }
    }

    /// Sets the source.
    pub fn with_source(mut self, source: DecisionSource) -> Self {
        self.source = source;
        self
    }

    /// Returns true if the decision replaces the whole page.
    pub fn blocks_page(&self) -> bool {
        self.should_block && self.selectors_to_block.iter().any(|s| s == PAGE_SELECTOR)
    }
}

/// One candidate element extracted from a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageElement {
    pub selector: String,
    pub tag: String,
    pub text: String,
    pub heading: Option<String>,
    pub video_title: Option<String>,
    pub video_channel: Option<String>,
    pub is_video: bool,
    /// The element is the page's primary content (e.g. the playing video).
    pub is_main_content: bool,
    pub is_likely_distraction: bool,
}

impl PageElement {
    /// Text used for relevance: video title, then heading, then body text.
    pub fn label(&self) -> &str {
        self.video_title
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.heading.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(&self.text)
    }
}

/// What the extension extracted from a tab.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub text: String,
    pub hostname: String,
    pub elements: Vec<PageElement>,
}

impl PageSnapshot {
    /// Normalized domain, taken from `hostname` or else from `url`.
    pub fn domain(&self) -> Option<String> {
        domain::normalize(&self.hostname).or_else(|| domain::normalize(&self.url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_page_is_page_level() {
        let d = Decision::block_page("distraction", 10);
        assert!(d.blocks_page());
        assert!(!d.has_related_content);
        assert!(!Decision::allow("relevant", 90).blocks_page());
    }

    #[test]
    fn score_is_capped() {
        assert_eq!(Decision::allow("x", 250).score, 100);
    }

    #[test]
    fn element_label_prefers_video_title() {
        let el = PageElement {
            text: "body text".into(),
            heading: Some("Heading".into()),
            video_title: Some("Video".into()),
            ..Default::default()
        };
        assert_eq!(el.label(), "Video");

        let el = PageElement {
            text: "body text".into(),
            heading: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(el.label(), "body text");
    }

    #[test]
    fn snapshot_domain_falls_back_to_url() {
        let page = PageSnapshot {
            url: "https://www.youtube.com/watch?v=1".into(),
            ..Default::default()
        };
        assert_eq!(page.domain().as_deref(), Some("youtube.com"));
    }

    #[test]
    fn snapshot_deserializes_with_missing_fields() {
        let page: PageSnapshot =
            serde_json::from_str(r##"{"url":"https://a.com","elements":[{"selector":"#x"}]}"##)
                .unwrap();
        assert_eq!(page.elements.len(), 1);
        assert!(page.title.is_empty());
    }
}
