//! Remote model classification.
//!
//! Two transports share one prompt format: a backend proxy
//! (`POST <backend>/api/analyze-page`, bearer token) and the model API
//! called directly with an API key. A single [`RemoteClassifier::send`] is one
//! HTTP attempt; spacing and retries belong to the scheduler.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use super::category::SiteCategory;
use super::{Decision, DecisionSource, PageElement, PageSnapshot};
use crate::scheduler::{RemoteResponse, SchedulerError, TransportError};
use crate::settings::Settings;

/// First `{...}` span of model output, across newlines.
static JSON_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("Invalid JSON span regex"));

/// Per-request timeout of the HTTP transport.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Output token budget for whole-page prompts.
pub(crate) const PAGE_MAX_TOKENS: u32 = 200;

/// Output token budget for element prompts.
pub(crate) const ELEMENT_MAX_TOKENS: u32 = 500;

/// Characters of page text included in the whole-page prompt.
const PROMPT_TEXT_CHARS: usize = 1000;

/// Characters of element text used when an element has no heading.
const ELEMENT_TEXT_CHARS: usize = 50;

/// Errors from the remote classification path.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Http(String),

    /// The response had no usable model text or JSON.
    #[error("unparsable classifier response: {0}")]
    Parse(String),

    /// Neither an API key nor a backend is set up.
    #[error("no remote classifier configured")]
    NotConfigured,

    /// All attempts failed.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl ClassifierError {
    /// Returns true if the failure was caused by throttling.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClassifierError::Scheduler(e) if e.was_throttled())
    }
}

/// One attempt against the remote model.
#[async_trait]
pub trait RemoteClassifier: Send + Sync {
    /// Sends `prompt` using the transport `settings` select.
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    async fn send(
        &self,
        settings: &Settings,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<RemoteResponse, TransportError>;
}

/// `reqwest`-based transport.
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    client: reqwest::Client,
}

impl HttpClassifier {
    /// Creates a transport with [`DEFAULT_REQUEST_TIMEOUT`].
    pub fn new() -> Result<Self, ClassifierError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Http(e.to_string()))?;
        Ok(Self { client })
    }

    fn build_request(
        &self,
        settings: &Settings,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        if settings.uses_backend() {
            let base = settings.backend_url.as_deref().unwrap_or_default();
            let token = settings.auth_token.as_deref().unwrap_or_default();
            let endpoint = format!("{}/api/analyze-page", base.trim_end_matches('/'));
            return Ok(self
                .client
                .post(endpoint)
                .bearer_auth(token)
                .json(&json!({ "prompt": prompt })));
        }

        let key = settings
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| TransportError(ClassifierError::NotConfigured.to_string()))?;
        let mut endpoint = url::Url::parse(settings.effective_api_url())
            .map_err(|e| TransportError(format!("invalid model url: {e}")))?;
        endpoint.query_pairs_mut().append_pair("key", key);

        Ok(self.client.post(endpoint).json(&json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0.3,
                "maxOutputTokens": max_output_tokens,
            }
        })))
    }
}

#[async_trait]
impl RemoteClassifier for HttpClassifier {
    async fn send(
        &self,
        settings: &Settings,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<RemoteResponse, TransportError> {
        let request = self.build_request(settings, prompt, max_output_tokens)?;
        let response = request
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        tracing::debug!(status, body_len = body.len(), "Classifier response");
        Ok(RemoteResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Pulls the model text out of a response body.
///
/// Accepts the model API shape (`candidates[0].content.parts[0].text`) and
/// the backend shape (`text`).
pub(crate) fn response_text(body: &str) -> Result<String, ClassifierError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| ClassifierError::Parse(e.to_string()))?;
    value
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .or_else(|| value.get("text").and_then(Value::as_str))
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| ClassifierError::Parse("no model text in response".into()))
}

/// Returns the outermost `{...}` span of `text`, across newlines.
pub fn extract_json_span(text: &str) -> Option<&str> {
    JSON_SPAN.find(text).map(|m| m.as_str())
}

fn parse_span<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, ClassifierError> {
    let span = extract_json_span(text).unwrap_or(text);
    serde_json::from_str(span).map_err(|e| ClassifierError::Parse(e.to_string()))
}

/// Whole-page reply: `{action, score, reason}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageVerdict {
    pub action: String,
    pub score: Option<f64>,
    pub reason: Option<String>,
}

impl PageVerdict {
    /// Parses the first JSON object in model text.
    pub fn parse(text: &str) -> Result<Self, ClassifierError> {
        parse_span(text)
    }

    pub fn into_decision(self) -> Decision {
        let should_block = self.action.trim().eq_ignore_ascii_case("block");
        let score = self.score.unwrap_or(50.0).clamp(0.0, 100.0).round() as u8;
        let reason = self
            .reason
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "analyzed".to_string());
        let decision = if should_block {
            Decision::block_page(reason, score)
        } else {
            Decision::allow(reason, score)
        };
        decision.with_source(DecisionSource::Remote)
    }
}

/// Element reply: `{block, keep, hasRelatedContent}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ElementVerdict {
    pub block: Vec<String>,
    pub keep: Vec<String>,
    #[serde(rename = "hasRelatedContent")]
    pub has_related_content: Option<bool>,
}

impl ElementVerdict {
    /// Parses the first JSON object in model text.
    pub fn parse(text: &str) -> Result<Self, ClassifierError> {
        parse_span(text)
    }

    /// Converts to a decision that never blocks the page itself.
    pub fn into_decision(self) -> Decision {
        let has_related_content = self.has_related_content.unwrap_or(true);
        Decision {
            selectors_to_block: self.block,
            should_block: false,
            score: if has_related_content { 80 } else { 20 },
            reason: "ai-analyzed".to_string(),
            has_related_content,
            source: DecisionSource::Remote,
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Prompt for whole-page classification.
pub(crate) fn page_prompt(page: &PageSnapshot, task: &str) -> String {
    format!(
        r#"You are a focus assistant. Decide whether a web page is relevant to the user's study goal.

Study goal: "{task}"

Page:
- URL: {url}
- Title: {title}
- Content preview: {preview}...

Reply with one JSON object:
- relevant: {{"action": "allow", "score": 80-100, "reason": "relevant"}}
- partly relevant: {{"action": "allow", "score": 40-70, "reason": "partially relevant"}}
- not relevant: {{"action": "block", "score": 0-30, "reason": "distraction"}}

Respond with ONLY valid JSON."#,
        url = page.url,
        title = page.title,
        preview = truncate(&page.text, PROMPT_TEXT_CHARS),
    )
}

fn describe_element(index: usize, element: &PageElement) -> String {
    if element.is_video {
        format!(
            "{}. {} - VIDEO: \"{}\" by {}",
            index + 1,
            element.selector,
            element.video_title.as_deref().unwrap_or_default(),
            element.video_channel.as_deref().unwrap_or("unknown"),
        )
    } else {
        let label = element
            .heading
            .as_deref()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| truncate(&element.text, ELEMENT_TEXT_CHARS));
        format!("{}. {}: \"{}\"", index + 1, element.selector, label)
    }
}

/// Prompt for element-by-element classification.
pub(crate) fn element_prompt(
    page: &PageSnapshot,
    elements: &[PageElement],
    task: &str,
    category: SiteCategory,
) -> String {
    let items = elements
        .iter()
        .enumerate()
        .map(|(i, el)| describe_element(i, el))
        .collect::<Vec<_>>()
        .join("\n");
    let kind = match category {
        SiteCategory::Search => "search results",
        SiteCategory::RichMedia => "videos and content items",
        SiteCategory::General => "page sections",
    };

    format!(
        r#"You are a focus assistant. Show ONLY {kind} related to the user's study goal.

Study goal: "{task}"

Page: {title}
URL: {url}

Items:
{items}

For each item decide whether it is RELATED to "{task}". Reply with one JSON object:
- "block": selectors of UNRELATED items
- "keep": selectors of RELATED items
- "hasRelatedContent": true if ANY item is related

Respond with ONLY valid JSON."#,
        title = page.title,
        url = page.url,
    )
}
