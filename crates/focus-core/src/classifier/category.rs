//! Site categories that select the classification mode.

use serde::{Deserialize, Serialize};

use crate::domain::host_matches;

/// Hosts whose pages are never blocked as a whole; elements are filtered.
const RICH_MEDIA_HOSTS: &[&str] = &[
    "youtube.com",
    "netflix.com",
    "hulu.com",
    "disneyplus.com",
    "primevideo.com",
    "hbo.com",
    "paramount.com",
];

/// Learning resources, allowed by the keyword fallback regardless of score.
const EDUCATIONAL_SITES: &[&str] = &[
    "wikipedia.org",
    "edu",
    "scholar.google.com",
    "pubmed",
    "jstor.org",
    "arxiv.org",
    "coursera.org",
    "edx.org",
    "khanacademy.org",
    "udemy.com",
];

/// Entertainment and social sites that need a higher relevance to pass.
const DISTRACTING_SITES: &[&str] = &[
    "youtube.com",
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "tiktok.com",
    "reddit.com",
    "netflix.com",
    "hulu.com",
    "disneyplus.com",
    "primevideo.com",
    "spotify.com",
];

/// Selector fragments that would hide a media page's player or layout.
const PROTECTED_SELECTOR_FRAGMENTS: &[&str] =
    &["body", "html", "#player", "#primary", "ytd-watch-flexy"];

/// Matches a list entry against a host.
///
/// Dotted entries match the host or its subdomains. Bare entries such as
/// `edu` or `pubmed` match any single label of the host.
fn entry_matches(host: &str, entry: &str) -> bool {
    if entry.contains('.') {
        host_matches(host, entry)
    } else {
        host.split('.').any(|label| label == entry)
    }
}

fn in_list(host: &str, list: &[&str]) -> bool {
    list.iter().any(|entry| entry_matches(host, entry))
}

/// How a page is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteCategory {
    /// Search results: element mode, never blocked whole.
    Search,
    /// Video and streaming hosts: element mode, never blocked whole.
    RichMedia,
    /// Everything else: whole-page mode.
    General,
}

impl SiteCategory {
    /// Picks the category for a page. `host` must be normalized.
    pub fn detect(url: &str, host: &str) -> Self {
        if is_search_page(url, host) {
            SiteCategory::Search
        } else if in_list(host, RICH_MEDIA_HOSTS) {
            SiteCategory::RichMedia
        } else {
            SiteCategory::General
        }
    }

    /// Returns true if the page is classified element by element.
    pub fn is_element_mode(&self) -> bool {
        !matches!(self, SiteCategory::General)
    }
}

/// Returns true for search result URLs.
fn is_search_page(url: &str, host: &str) -> bool {
    let url = url.to_lowercase();
    let has = |s: &str| url.contains(s);

    let engine_match = if host_matches(host, "google.com") {
        has("/search") || has("?q=") || has("&q=")
    } else if host_matches(host, "wikipedia.org") {
        has("/wiki/") || has("search=")
    } else if host_matches(host, "bing.com") || host_matches(host, "reddit.com") {
        has("/search")
    } else if host_matches(host, "duckduckgo.com") {
        has("?q=")
    } else if host_matches(host, "youtube.com") {
        has("/results?search_query=")
    } else {
        false
    };

    engine_match || has("search?") || has("?search=") || has("&search=")
}

/// Returns true for pages that play a specific video.
pub fn is_watch_page(url: &str) -> bool {
    url.contains("/watch") || url.contains("/embed/")
}

/// Returns true if hiding `selector` would hide a media page's main content.
pub(crate) fn is_protected_selector(selector: &str) -> bool {
    PROTECTED_SELECTOR_FRAGMENTS
        .iter()
        .any(|fragment| selector.contains(fragment))
}

/// Site class used by the keyword fallback thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteClass {
    Educational,
    Distracting,
    Other,
}

impl SiteClass {
    /// Classifies a normalized host.
    pub fn of(host: &str) -> Self {
        if in_list(host, EDUCATIONAL_SITES) {
            SiteClass::Educational
        } else if in_list(host, DISTRACTING_SITES) {
            SiteClass::Distracting
        } else {
            SiteClass::Other
        }
    }
}
