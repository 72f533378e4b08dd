//! API request and response models.

use focus_core::{BlockRule, Decision, PageSnapshot, Session, Settings, TabId};
use focus_storage::{FocusStats, SessionHistoryEntry};
use serde::{Deserialize, Serialize};

/// Request body for POST /api/session/start.
#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// What the user wants to focus on.
    pub task: String,
    pub duration_minutes: u32,
}

/// Response body for POST /api/session/start.
#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub success: bool,
    pub session: Session,
}

/// Response body for POST /api/session/end.
#[derive(Debug, Serialize)]
pub struct EndSessionResponse {
    pub success: bool,
    pub was_active: bool,
}

/// Response body for GET /api/session.
#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    pub remaining_minutes: u32,
}

/// Request body for POST /api/navigation.
#[derive(Debug, Deserialize)]
pub struct NavigationRequest {
    pub tab_id: TabId,
    pub url: String,
    /// Defaults to true; subframe commits are ignored.
    #[serde(default = "default_main_frame")]
    pub main_frame: bool,
}

fn default_main_frame() -> bool {
    true
}

/// Request body for POST /api/analyze.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub tab_id: TabId,
    pub page: PageSnapshot,
}

/// Response body for POST /api/analyze.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    /// False when no session is active or the page is internal.
    pub analyzed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
}

/// Response body for GET /api/rules.
#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub rules: Vec<BlockRule>,
}

/// Response body for PUT /api/settings.
#[derive(Debug, Serialize)]
pub struct UpdateSettingsResponse {
    pub success: bool,
    pub settings: Settings,
    /// Rules installed after the resync.
    pub rules: Vec<BlockRule>,
}

/// Query parameters for GET /api/stats.
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// Number of recent sessions to include (default: 10).
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    10
}

/// Response body for GET /api/stats.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: FocusStats,
    pub recent_sessions: Vec<SessionHistoryEntry>,
}
