//! Hostname normalization.
//!
//! Every component compares domains through [`normalize`] so that
//! `https://www.Example.com/path`, `example.com`, and `EXAMPLE.COM` all map to
//! the same key.

use url::Url;

/// URL prefixes that belong to the browser or to the extension itself.
const INTERNAL_SCHEMES: &[&str] = &["chrome://", "chrome-extension://", "moz-extension://", "about:"];

/// Extension pages that must never be analyzed or blocked.
const EXTENSION_PAGES: &[&str] = &["settings.html", "blocked.html", "analytics.html", "help.html"];

/// Normalizes a URL or bare domain to a hostname.
///
/// Prepends `https://` when no http(s) scheme is present, strips a leading
/// `www.`, and lowercases. Returns `None` for empty or unparsable input.
///
/// # Examples
///
/// ```
/// use focus_core::domain::normalize;
///
/// assert_eq!(normalize("https://www.Example.com/a?b=c").as_deref(), Some("example.com"));
/// assert_eq!(normalize("reddit.com").as_deref(), Some("reddit.com"));
/// assert_eq!(normalize(""), None);
/// ```
pub fn normalize(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lower = trimmed.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = Url::parse(&candidate).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        return None;
    }
    Some(host.to_string())
}

/// Normalizes a list of user-entered domains, dropping invalid entries and
/// duplicates while keeping first-seen order.
pub fn normalize_all<S: AsRef<str>>(inputs: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(inputs.len());
    for input in inputs {
        if let Some(host) = normalize(input.as_ref()) {
            if !out.contains(&host) {
                out.push(host);
            }
        }
    }
    out
}

/// Returns true if `host` is `domain` itself or one of its subdomains.
///
/// Both arguments are expected to be normalized already.
pub fn host_matches(host: &str, domain: &str) -> bool {
    if domain.is_empty() {
        return false;
    }
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

/// Returns true if `host` matches any entry of a normalized domain list.
pub fn matches_any(host: &str, domains: &[String]) -> bool {
    domains.iter().any(|d| host_matches(host, d))
}

/// Returns true for browser-internal URLs and the extension's own pages.
pub fn is_internal_page(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return true;
    }
    INTERNAL_SCHEMES.iter().any(|s| lower.starts_with(s))
        || EXTENSION_PAGES.iter().any(|p| lower.contains(p))
}

/// Returns true for the browser's extension management page.
pub fn is_extension_management_page(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    lower.starts_with("chrome://extensions") || lower.starts_with("about:addons")
}
