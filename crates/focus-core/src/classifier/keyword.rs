//! Keyword-based relevance matching.
//!
//! Used when the remote classifier is not configured or has failed. Scores a
//! page by how many task words appear in its title, URL, and text.

use super::category::SiteClass;
use super::{Decision, DecisionSource, PageElement, PageSnapshot};

/// Task words carrying no topic information.
const STOPWORDS: &[&str] = &[
    "the", "and", "or", "for", "with", "from", "learn", "study", "practice",
];

/// Match weights for the page fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordWeights {
    pub title: u32,
    pub url: u32,
    pub text: u32,
    /// Weight of a stem (prefix) match in title or text.
    pub stem: u32,
    /// Characters of page text that are searched.
    pub text_sample_chars: usize,
    /// Characters that make up a stem.
    pub stem_chars: usize,
}

impl KeywordWeights {
    /// Highest total a single word can contribute.
    pub fn max_per_word(&self) -> u32 {
        self.title + self.url + self.text + self.stem
    }
}

impl Default for KeywordWeights {
    fn default() -> Self {
        Self {
            title: 4,
            url: 3,
            text: 2,
            stem: 1,
            text_sample_chars: 5000,
            stem_chars: 5,
        }
    }
}

/// Relevance needed to pass the keyword fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceThresholds {
    /// Pages on distracting sites.
    pub distracting: f64,
    /// Pages on all other non-educational sites.
    pub other: f64,
    /// Individual elements in element mode.
    pub element: f64,
}

impl Default for RelevanceThresholds {
    fn default() -> Self {
        Self {
            distracting: 0.5,
            other: 0.3,
            element: 0.2,
        }
    }
}

/// Keyword fallback classifier.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    weights: KeywordWeights,
    thresholds: RelevanceThresholds,
}

impl KeywordClassifier {
    /// Creates a classifier with the default weights and thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(weights: KeywordWeights, thresholds: RelevanceThresholds) -> Self {
        Self {
            weights,
            thresholds,
        }
    }

    /// Lowercased task words longer than two characters, minus stopwords.
    pub fn task_words(task: &str) -> Vec<String> {
        task.to_lowercase()
            .split_whitespace()
            .filter(|w| w.chars().count() > 2)
            .filter(|w| !STOPWORDS.contains(w))
            .map(str::to_string)
            .collect()
    }

    /// Weighted relevance of a page, in `[0, 1]`.
    pub fn page_relevance(&self, page: &PageSnapshot, words: &[String]) -> f64 {
        if words.is_empty() {
            return 0.0;
        }

        let title = page.title.to_lowercase();
        let url = page.url.to_lowercase();
        let text: String = page
            .text
            .to_lowercase()
            .chars()
            .take(self.weights.text_sample_chars)
            .collect();

        let w = &self.weights;
        let total: u32 = words
            .iter()
            .map(|word| {
                let stem: String = word.chars().take(w.stem_chars).collect();
                let mut score = 0;
                if title.contains(word.as_str()) {
                    score += w.title;
                }
                if url.contains(word.as_str()) {
                    score += w.url;
                }
                if text.contains(word.as_str()) {
                    score += w.text;
                }
                if text.contains(&stem) || title.contains(&stem) {
                    score += w.stem;
                }
                score
            })
            .sum();

        let max = w.max_per_word() as f64 * words.len() as f64;
        (total as f64 / max).min(1.0)
    }

    /// Whole-page fallback decision. `host` must be normalized.
    pub fn classify_page(&self, page: &PageSnapshot, host: &str, task: &str) -> Decision {
        let words = Self::task_words(task);
        let relevance = self.page_relevance(page, &words);
        let class = SiteClass::of(host);

        let should_block = match class {
            SiteClass::Educational => false,
            SiteClass::Distracting => relevance < self.thresholds.distracting,
            SiteClass::Other => relevance < self.thresholds.other,
        };

        tracing::debug!(
            host,
            ?class,
            relevance,
            should_block,
            "Keyword page analysis"
        );

        let score = (relevance * 100.0).round() as u8;
        let decision = if should_block {
            Decision::block_page("keyword-fallback-not-relevant", score)
        } else {
            Decision::allow("keyword-fallback-relevant", score)
        };
        decision.with_source(DecisionSource::KeywordFallback)
    }

    /// Fraction of task words found in an element's label.
    pub fn element_relevance(element: &PageElement, words: &[String]) -> f64 {
        if words.is_empty() {
            return 0.0;
        }
        let label = element.label().to_lowercase();
        let matches = words.iter().filter(|w| label.contains(w.as_str())).count();
        matches as f64 / words.len() as f64
    }

    /// Element-mode fallback decision. Never blocks the page itself.
    pub fn classify_elements(&self, elements: &[PageElement], task: &str) -> Decision {
        let words = Self::task_words(task);
        let mut selectors_to_block = Vec::new();
        let mut has_related_content = false;

        for element in elements {
            if Self::element_relevance(element, &words) < self.thresholds.element {
                selectors_to_block.push(element.selector.clone());
            } else {
                has_related_content = true;
            }
        }

        Decision {
            selectors_to_block,
            should_block: false,
            score: if has_related_content { 60 } else { 10 },
            reason: "keyword-fallback".to_string(),
            has_related_content,
            source: DecisionSource::KeywordFallback,
        }
    }
}
