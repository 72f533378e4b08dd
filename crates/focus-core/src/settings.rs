//! User settings read at each decision point.
//!
//! The settings store itself is owned by the settings UI; the core only
//! reads it. [`Settings::migrate`] upgrades values written by older versions.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::domain;

/// Current model endpoint for direct classification calls.
pub const CURRENT_MODEL_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-flash-lite-latest:generateContent";

/// Model name fragments that no longer resolve to a live model.
const DEPRECATED_MODEL_MARKERS: &[&str] = &["gemini-pro", "gemini-1.5", "gemini-2", "gemini-3"];

/// User-facing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Domains never analyzed or blocked.
    pub always_allow: Vec<String>,
    /// Domains blocked at the network layer regardless of session state.
    pub always_block: Vec<String>,
    /// API key for direct model calls.
    pub api_key: Option<String>,
    /// Model endpoint for direct calls.
    pub api_url: String,
    /// Backend proxy base URL. Used only together with `auth_token`.
    pub backend_url: Option<String>,
    /// Bearer token for the backend proxy.
    pub auth_token: Option<String>,
    /// Whether desktop notifications are shown.
    pub notifications_enabled: bool,
    pub auto_navigate_enabled: bool,
    pub learning_mode_enabled: bool,
    pub focus_coach_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            always_allow: Vec::new(),
            always_block: Vec::new(),
            api_key: None,
            api_url: CURRENT_MODEL_URL.to_string(),
            backend_url: None,
            auth_token: None,
            notifications_enabled: true,
            auto_navigate_enabled: true,
            learning_mode_enabled: true,
            focus_coach_enabled: true,
        }
    }
}

impl Settings {
    /// Rewrites values left behind by older versions.
    ///
    /// Returns true if anything changed and the caller should persist.
    pub fn migrate(&mut self) -> bool {
        let mut changed = false;

        if self.api_url.trim().is_empty() || is_deprecated_model_url(&self.api_url) {
            tracing::info!(old = %self.api_url, "Migrating deprecated model URL");
            self.api_url = CURRENT_MODEL_URL.to_string();
            changed = true;
        }

        if matches!(self.api_key.as_deref(), Some(k) if k.trim().is_empty()) {
            self.api_key = None;
            changed = true;
        }

        changed
    }

    /// Normalized always-allow hostnames.
    pub fn allowed_hosts(&self) -> Vec<String> {
        domain::normalize_all(&self.always_allow)
    }

    /// Normalized always-block hostnames.
    pub fn blocked_hosts(&self) -> Vec<String> {
        domain::normalize_all(&self.always_block)
    }

    /// Returns true if `host` (normalized) is on the always-allow list.
    pub fn is_always_allowed(&self, host: &str) -> bool {
        domain::matches_any(host, &self.allowed_hosts())
    }

    /// Returns true if `host` (normalized) is on the always-block list.
    pub fn is_always_blocked(&self, host: &str) -> bool {
        domain::matches_any(host, &self.blocked_hosts())
    }

    /// Returns true if either a backend proxy or a direct API key is set up.
    pub fn has_remote_classifier(&self) -> bool {
        self.uses_backend() || self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Returns true if calls should go through the backend proxy.
    pub fn uses_backend(&self) -> bool {
        self.backend_url.as_deref().is_some_and(|u| !u.is_empty())
            && self.auth_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Returns the model URL with deprecated names replaced.
    pub fn effective_api_url(&self) -> &str {
        if self.api_url.is_empty() || is_deprecated_model_url(&self.api_url) {
            CURRENT_MODEL_URL
        } else {
            &self.api_url
        }
    }
}

fn is_deprecated_model_url(url: &str) -> bool {
    DEPRECATED_MODEL_MARKERS.iter().any(|m| url.contains(m))
}

/// Error reading or writing settings.
#[derive(Debug, thiserror::Error)]
#[error("settings store error: {0}")]
pub struct SettingsError(pub String);

/// Read access to the settings store.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// Loads the current settings, with defaults merged in.
    async fn load(&self) -> Result<Settings, SettingsError>;
}

/// Settings held in memory. Used by tests and embedders without a store.
#[derive(Debug, Default)]
pub struct InMemorySettings {
    settings: RwLock<Settings>,
}

impl InMemorySettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// Replaces the held settings.
    pub fn set(&self, settings: Settings) {
        *self.settings.write() = settings;
    }
}

#[async_trait]
impl SettingsSource for InMemorySettings {
    async fn load(&self) -> Result<Settings, SettingsError> {
        Ok(self.settings.read().clone())
    }
}
