//! API route handlers.

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use focus_core::{NavigationVerdict, Settings, TabId};

use crate::error::{ApiError, Result};
use crate::models::{
    AnalyzeRequest, AnalyzeResponse, EndSessionResponse, NavigationRequest, RulesResponse,
    SessionStatusResponse, StartSessionRequest, StartSessionResponse, StatsQuery, StatsResponse,
    UpdateSettingsResponse,
};
use crate::state::AppState;

/// POST /api/session/start - Start a focus session.
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Result<Json<StartSessionResponse>> {
    let session = state
        .engine
        .sessions()
        .start_session(&req.task, req.duration_minutes)
        .await?;

    Ok(Json(StartSessionResponse {
        success: true,
        session,
    }))
}

/// POST /api/session/end - End the active session.
pub async fn end_session(State(state): State<AppState>) -> Json<EndSessionResponse> {
    let outcome = state.engine.sessions().end_session().await;
    Json(EndSessionResponse {
        success: true,
        was_active: outcome.was_active,
    })
}

/// GET /api/session - Current session status.
pub async fn get_session(State(state): State<AppState>) -> Json<SessionStatusResponse> {
    let sessions = state.engine.sessions();
    let session = sessions.current();
    Json(SessionStatusResponse {
        active: session.is_some(),
        session,
        remaining_minutes: sessions.remaining_minutes(),
    })
}

/// POST /api/navigation - Check a navigation commit.
pub async fn check_navigation(
    State(state): State<AppState>,
    Json(req): Json<NavigationRequest>,
) -> Json<NavigationVerdict> {
    Json(
        state
            .engine
            .check_navigation(req.tab_id, &req.url, req.main_frame)
            .await,
    )
}

/// POST /api/analyze - Classify a loaded page.
pub async fn analyze_page(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>> {
    if req.page.url.trim().is_empty() {
        return Err(ApiError::BadRequest("page url is required".into()));
    }
    debug!(tab = req.tab_id, url = %req.page.url, elements = req.page.elements.len(), "Analyze request");

    let decision = state.engine.analyze_page(req.tab_id, &req.page).await;
    Ok(Json(AnalyzeResponse {
        analyzed: decision.is_some(),
        decision,
    }))
}

/// DELETE /api/tabs/{tab_id} - Forget a closed tab.
pub async fn close_tab(State(state): State<AppState>, Path(tab_id): Path<TabId>) -> Json<serde_json::Value> {
    state.engine.close_tab(tab_id);
    Json(serde_json::json!({ "success": true }))
}

/// GET /api/rules - Installed network block rules.
pub async fn get_rules(State(state): State<AppState>) -> Result<Json<RulesResponse>> {
    let rules = state.engine.rules().await?;
    Ok(Json(RulesResponse { rules }))
}

/// GET /api/settings - Current settings.
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<Settings>> {
    Ok(Json(state.db.load_settings()?))
}

/// PUT /api/settings - Save settings and resync network rules.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> Result<Json<UpdateSettingsResponse>> {
    let settings = state.db.save_settings(settings)?;
    let rules = state.engine.sync_rules().await?;
    info!(
        always_allow = settings.always_allow.len(),
        always_block = settings.always_block.len(),
        "Settings updated"
    );

    Ok(Json(UpdateSettingsResponse {
        success: true,
        settings,
        rules,
    }))
}

/// GET /api/stats - Focus statistics and recent sessions.
pub async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>> {
    let limit = query.limit.clamp(1, 100);
    Ok(Json(StatsResponse {
        stats: state.db.focus_stats()?,
        recent_sessions: state.db.recent_sessions(limit)?,
    }))
}

/// GET /api/events - Tab messages as server-sent events.
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.outbox.subscribe();
    debug!("Event stream subscriber connected");

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    let event = Event::default()
                        .event(envelope.message.action())
                        .json_data(&envelope)
                        .unwrap_or_else(|e| {
                            warn!(error = %e, "Failed to encode tab message");
                            Event::default().comment("encoding error")
                        });
                    return Some((Ok(event), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
