//! Focus-session state machine.
//!
//! ```text
//!   Idle ──start──▶ Active ──end / timer──▶ Idle
//! ```
//!
//! The [`SessionManager`] owns the single active [`Session`], its end timer,
//! and the side effects of starting and ending (network rules, cache, tab
//! broadcast, persistence, analytics).

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::classifier::ClassificationPipeline;
use crate::dispatch::{DispatchTarget, TabDispatcher, TabMessage};
use crate::network_rules::NetworkRuleSync;
use crate::settings::{Settings, SettingsSource};

/// Longest session accepted (24 hours).
pub const MAX_SESSION_MINUTES: u32 = 24 * 60;

/// Sessions per day on the free plan.
pub const FREE_DAILY_SESSION_LIMIT: u32 = 3;

/// Length of the trial granted on the first session.
pub const TRIAL_DAYS: i64 = 7;

/// An active focus session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub task_description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub active: bool,
}

impl Session {
    /// Creates a session starting at `start`.
    pub fn new(task_description: impl Into<String>, duration_minutes: u32, start: DateTime<Utc>) -> Self {
        Self {
            task_description: task_description.into(),
            start_time: start,
            end_time: start + chrono::Duration::minutes(i64::from(duration_minutes)),
            duration_minutes,
            active: true,
        }
    }

    /// Whole minutes left, rounded up. Zero once the end time has passed.
    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> u32 {
        let ms = (self.end_time - now).num_milliseconds().max(0);
        u32::try_from((ms + 59_999) / 60_000).unwrap_or(u32::MAX)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    fn time_left(&self, now: DateTime<Utc>) -> Duration {
        (self.end_time - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Subscription plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    None,
    Trial,
    Free,
    Premium,
}

/// Stored subscription record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub plan: Plan,
    pub trial_end: Option<DateTime<Utc>>,
    pub premium_end: Option<DateTime<Utc>>,
}

impl Default for Subscription {
    fn default() -> Self {
        Self {
            plan: Plan::Free,
            trial_end: None,
            premium_end: None,
        }
    }
}

impl Subscription {
    /// A fresh trial starting at `now`.
    pub fn trial(now: DateTime<Utc>) -> Self {
        Self {
            plan: Plan::Trial,
            trial_end: Some(now + chrono::Duration::days(TRIAL_DAYS)),
            premium_end: None,
        }
    }

    /// Effective plan at `now`.
    ///
    /// A running trial wins, then running premium. Expired trials and
    /// premium plans fall back to free.
    pub fn effective_plan(&self, now: DateTime<Utc>) -> Plan {
        if self.plan == Plan::None {
            return Plan::None;
        }
        if self.trial_end.is_some_and(|end| end > now) {
            return Plan::Trial;
        }
        if self.plan == Plan::Premium && self.premium_end.is_some_and(|end| end > now) {
            return Plan::Premium;
        }
        Plan::Free
    }

    /// Returns true if sessions may be started at all.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.effective_plan(now) != Plan::None
    }
}

/// Error reported by a session collaborator store.
#[derive(Debug, Clone, thiserror::Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

/// Persisted session record, re-validated on every cold start.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> Result<Option<Session>, StoreError>;
    async fn save(&self, session: &Session) -> Result<(), StoreError>;
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Plan and quota lookups.
#[async_trait]
pub trait Entitlements: Send + Sync {
    async fn subscription(&self) -> Result<Subscription, StoreError>;

    /// Sessions started on the local calendar day containing `now`.
    async fn sessions_today(&self, now: DateTime<Utc>) -> Result<u32, StoreError>;
}

/// Session start and end hooks.
#[async_trait]
pub trait SessionAnalytics: Send + Sync {
    /// Called after a session starts. Initializes the trial on first use.
    async fn record_start(&self, session: &Session) -> Result<(), StoreError>;

    /// Called when a session ends, normally or early.
    async fn record_end(&self, session: &Session, ended_at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Session lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid session request: {0}")]
    Validation(String),

    #[error("{0}")]
    QuotaExceeded(String),

    #[error("session storage failed: {0}")]
    Storage(#[from] StoreError),
}

impl SessionError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Validation(_) => "validation",
            SessionError::QuotaExceeded(_) => "quota_exceeded",
            SessionError::Storage(_) => "storage",
        }
    }
}

/// Result of [`SessionManager::end_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EndOutcome {
    pub was_active: bool,
}

/// Result of [`SessionManager::restore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// A persisted session was still running and is active again.
    Resumed(Session),
    /// The persisted session had ended while the process was down.
    Expired,
    /// Nothing was persisted.
    NoSession,
}

/// Session limits.
#[derive(Debug, Clone)]
pub struct SessionLimits {
    pub max_minutes: u32,
    pub free_daily_sessions: u32,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_minutes: MAX_SESSION_MINUTES,
            free_daily_sessions: FREE_DAILY_SESSION_LIMIT,
        }
    }
}

/// Collaborators of the session manager.
pub struct SessionDeps {
    pub store: Arc<dyn SessionStore>,
    pub entitlements: Arc<dyn Entitlements>,
    pub analytics: Arc<dyn SessionAnalytics>,
    pub settings: Arc<dyn SettingsSource>,
    pub rules: Arc<NetworkRuleSync>,
    pub pipeline: Arc<ClassificationPipeline>,
    pub dispatcher: Arc<dyn TabDispatcher>,
}

#[derive(Default)]
struct SlotState {
    session: Option<Session>,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever the slot changes, so stale timers do nothing.
    generation: u64,
}

struct Inner {
    deps: SessionDeps,
    limits: SessionLimits,
    state: Mutex<SlotState>,
}

/// Owns the focus-session state machine.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SessionManager")
            .field("session", &state.session)
            .field("generation", &state.generation)
            .finish()
    }
}

impl SessionManager {
    pub fn new(deps: SessionDeps) -> Self {
        Self::with_limits(deps, SessionLimits::default())
    }

    pub fn with_limits(deps: SessionDeps, limits: SessionLimits) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps,
                limits,
                state: Mutex::new(SlotState::default()),
            }),
        }
    }

    /// The active session, if any.
    pub fn current(&self) -> Option<Session> {
        self.inner.state.lock().session.clone()
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().session.is_some()
    }

    /// Minutes left in the active session, rounded up; 0 when idle.
    pub fn remaining_minutes(&self) -> u32 {
        self.inner
            .state
            .lock()
            .session
            .as_ref()
            .map_or(0, |s| s.remaining_minutes(Utc::now()))
    }

    /// Starts a session, replacing any active one.
    pub async fn start_session(
        &self,
        task: &str,
        duration_minutes: u32,
    ) -> Result<Session, SessionError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(SessionError::Validation("task description is required".into()));
        }
        if duration_minutes == 0 || duration_minutes > self.inner.limits.max_minutes {
            return Err(SessionError::Validation(format!(
                "duration must be between 1 and {} minutes",
                self.inner.limits.max_minutes
            )));
        }

        let now = Utc::now();
        self.check_quota(now).await?;

        let session = Session::new(task, duration_minutes, now);
        self.inner.deps.store.save(&session).await?;

        let replaced = self.install(session.clone(), now);
        if replaced {
            tracing::info!("Replaced the previous session");
        }

        let settings = self.load_settings().await;
        if let Err(e) = self.inner.deps.rules.apply_settings(&settings).await {
            tracing::error!(error = %e, "Failed to apply block rules at session start");
        }

        if let Err(e) = self.inner.deps.analytics.record_start(&session).await {
            tracing::warn!(error = %e, "Failed to record session start");
        }

        self.inner.deps.dispatcher.dispatch(
            DispatchTarget::All,
            TabMessage::StartBlocking {
                session: session.clone(),
            },
        );

        tracing::info!(
            task = %session.task_description,
            duration_minutes,
            end_time = %session.end_time,
            "Focus session started"
        );
        Ok(session)
    }

    /// Ends the active session. Idempotent.
    pub async fn end_session(&self) -> EndOutcome {
        self.end_inner(None).await
    }

    /// Reloads the persisted session after a restart.
    pub async fn restore(&self) -> Result<RestoreOutcome, SessionError> {
        let Some(session) = self.inner.deps.store.load().await? else {
            tracing::info!("No persisted session");
            if let Err(e) = self.inner.deps.rules.clear().await {
                tracing::error!(error = %e, "Failed to clear block rules");
            }
            return Ok(RestoreOutcome::NoSession);
        };

        let now = Utc::now();
        if session.is_expired(now) {
            tracing::info!(end_time = %session.end_time, "Persisted session expired, ending");
            {
                let mut state = self.inner.state.lock();
                state.session = Some(session);
                state.generation += 1;
            }
            self.end_session().await;
            return Ok(RestoreOutcome::Expired);
        }

        let mut session = session;
        session.active = true;
        self.install(session.clone(), now);

        let settings = self.load_settings().await;
        if let Err(e) = self.inner.deps.rules.apply_settings(&settings).await {
            tracing::error!(error = %e, "Failed to re-apply block rules");
        }

        tracing::info!(
            task = %session.task_description,
            remaining_minutes = session.remaining_minutes(now),
            "Resumed focus session"
        );
        Ok(RestoreOutcome::Resumed(session))
    }

    async fn check_quota(&self, now: DateTime<Utc>) -> Result<(), SessionError> {
        let subscription = self.inner.deps.entitlements.subscription().await?;
        match subscription.effective_plan(now) {
            Plan::None => Err(SessionError::QuotaExceeded(
                "Trial expired. Please upgrade to continue.".into(),
            )),
            Plan::Free => {
                let today = self.inner.deps.entitlements.sessions_today(now).await?;
                let limit = self.inner.limits.free_daily_sessions;
                if today >= limit {
                    Err(SessionError::QuotaExceeded(format!(
                        "Free tier limit reached ({limit} sessions/day). Upgrade to Premium for unlimited sessions."
                    )))
                } else {
                    Ok(())
                }
            }
            Plan::Trial | Plan::Premium => Ok(()),
        }
    }

    async fn load_settings(&self) -> Settings {
        match self.inner.deps.settings.load().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load settings, using defaults");
                Settings::default()
            }
        }
    }

    /// Puts `session` in the slot and arms its timer. Returns true if a
    /// previous session was replaced.
    fn install(&self, session: Session, now: DateTime<Utc>) -> bool {
        let wait = session.time_left(now);
        let mut state = self.inner.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        let generation = state.generation;
        let replaced = state.session.replace(session).is_some();

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            if let Some(inner) = weak.upgrade() {
                tracing::info!("Session timer fired");
                SessionManager { inner }.end_inner(Some(generation)).await;
            }
        }));
        replaced
    }

    /// Takes the session out of the slot and runs cleanup.
    ///
    /// `timer_generation` is set when called from the end timer; the call is
    /// then a no-op unless the slot still holds that timer's session.
    async fn end_inner(&self, timer_generation: Option<u64>) -> EndOutcome {
        let session = {
            let mut state = self.inner.state.lock();
            if timer_generation.is_some_and(|g| g != state.generation) {
                return EndOutcome { was_active: false };
            }
            let Some(session) = state.session.take() else {
                return EndOutcome { was_active: false };
            };
            state.generation += 1;
            if let Some(timer) = state.timer.take() {
                // The timer task must not abort itself mid-cleanup.
                if timer_generation.is_none() {
                    timer.abort();
                }
            }
            session
        };

        let deps = &self.inner.deps;
        if let Err(e) = deps.analytics.record_end(&session, Utc::now()).await {
            tracing::warn!(error = %e, "Failed to record session end");
        }
        if let Err(e) = deps.store.clear().await {
            tracing::error!(error = %e, "Failed to remove persisted session");
        }
        if let Err(e) = deps.rules.clear().await {
            tracing::error!(error = %e, "Failed to clear block rules");
        }
        deps.pipeline.clear_cache();
        deps.dispatcher
            .dispatch(DispatchTarget::All, TabMessage::StopBlocking);

        tracing::info!(task = %session.task_description, "Focus session ended");
        EndOutcome { was_active: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, MemorySessionStore};

    #[test]
    fn session_end_time_matches_duration() {
        let start = Utc::now();
        let session = Session::new("rust", 25, start);
        assert_eq!((session.end_time - start).num_milliseconds(), 25 * 60_000);
        assert_eq!(session.remaining_minutes(start), 25);
        assert_eq!(
            session.remaining_minutes(start + chrono::Duration::seconds(61)),
            24
        );
        assert_eq!(session.remaining_minutes(session.end_time), 0);
        assert_eq!(
            session.remaining_minutes(session.end_time + chrono::Duration::minutes(5)),
            0
        );
    }

    #[test]
    fn subscription_plans() {
        let now = Utc::now();
        assert_eq!(Subscription::default().effective_plan(now), Plan::Free);
        assert_eq!(Subscription::trial(now).effective_plan(now), Plan::Trial);

        let expired_trial = Subscription::trial(now - chrono::Duration::days(8));
        assert_eq!(expired_trial.effective_plan(now), Plan::Free);

        let premium = Subscription {
            plan: Plan::Premium,
            trial_end: None,
            premium_end: Some(now + chrono::Duration::days(30)),
        };
        assert_eq!(premium.effective_plan(now), Plan::Premium);

        let none = Subscription {
            plan: Plan::None,
            ..Default::default()
        };
        assert!(!none.is_active(now));
    }

    #[tokio::test]
    async fn start_then_remaining_is_within_duration() {
        let fx = Fixture::new();
        fx.sessions.start_session("linear algebra", 30).await.unwrap();
        let remaining = fx.sessions.remaining_minutes();
        assert!(remaining > 0 && remaining <= 30, "remaining = {remaining}");
        assert!(fx.sessions.is_active());
    }

    #[tokio::test]
    async fn start_persists_applies_rules_and_broadcasts() {
        let fx = Fixture::new();
        let session = fx.sessions.start_session("  linear algebra ", 30).await.unwrap();

        assert_eq!(session.task_description, "linear algebra");
        assert_eq!(fx.store.get(), Some(session.clone()));
        assert_eq!(fx.rule_hosts().await, vec!["reddit.com"]);
        assert_eq!(fx.analytics.starts(), 1);
        assert_eq!(
            fx.dispatcher.messages(),
            vec![(DispatchTarget::All, TabMessage::StartBlocking { session })]
        );
    }

    #[tokio::test]
    async fn start_rejects_bad_input() {
        let fx = Fixture::new();
        for (task, minutes) in [("", 30), ("   ", 30), ("rust", 0), ("rust", MAX_SESSION_MINUTES + 1)] {
            let err = fx.sessions.start_session(task, minutes).await.unwrap_err();
            assert_eq!(err.code(), "validation", "{task:?} {minutes}");
        }
        assert!(!fx.sessions.is_active());
        assert!(fx.store.get().is_none());
    }

    #[tokio::test]
    async fn free_plan_limited_to_three_sessions_a_day() {
        let fx = Fixture::new();
        fx.entitlements.set_sessions_today(3);
        let err = fx.sessions.start_session("rust", 30).await.unwrap_err();
        assert!(matches!(err, SessionError::QuotaExceeded(_)));
        assert!(err.to_string().contains("3 sessions/day"));

        fx.entitlements.set_sessions_today(2);
        assert!(fx.sessions.start_session("rust", 30).await.is_ok());
    }

    #[tokio::test]
    async fn trial_ignores_daily_limit() {
        let fx = Fixture::new();
        fx.entitlements.set_subscription(Subscription::trial(Utc::now()));
        fx.entitlements.set_sessions_today(10);
        assert!(fx.sessions.start_session("rust", 30).await.is_ok());
    }

    #[tokio::test]
    async fn inactive_plan_is_refused() {
        let fx = Fixture::new();
        fx.entitlements.set_subscription(Subscription {
            plan: Plan::None,
            ..Default::default()
        });
        let err = fx.sessions.start_session("rust", 30).await.unwrap_err();
        assert_eq!(err.code(), "quota_exceeded");
    }

    #[tokio::test]
    async fn storage_failure_aborts_start() {
        let fx = Fixture::with_store(MemorySessionStore::failing());
        let err = fx.sessions.start_session("rust", 30).await.unwrap_err();
        assert_eq!(err.code(), "storage");
        assert!(!fx.sessions.is_active());
        assert!(fx.dispatcher.messages().is_empty());
    }

    #[tokio::test]
    async fn end_cleans_up_and_is_idempotent() {
        let fx = Fixture::new();
        fx.sessions.start_session("rust", 30).await.unwrap();
        fx.pipeline.cache().store("a.com", "rust", &crate::classifier::Decision::allow("x", 50));

        assert!(fx.sessions.end_session().await.was_active);
        assert!(!fx.sessions.is_active());
        assert!(fx.store.get().is_none());
        assert!(fx.rule_hosts().await.is_empty());
        assert!(fx.pipeline.cache().is_empty());
        assert_eq!(fx.analytics.ends(), 1);
        assert_eq!(
            fx.dispatcher.messages().last().map(|(_, m)| m.clone()),
            Some(TabMessage::StopBlocking)
        );

        let dispatched = fx.dispatcher.messages().len();
        assert!(!fx.sessions.end_session().await.was_active);
        assert_eq!(fx.analytics.ends(), 1);
        assert_eq!(fx.dispatcher.messages().len(), dispatched);
        assert_eq!(fx.sessions.remaining_minutes(), 0);
    }

    #[tokio::test]
    async fn end_continues_after_cleanup_failures() {
        let fx = Fixture::new();
        fx.sessions.start_session("rust", 30).await.unwrap();
        fx.store.fail_from_now();
        fx.analytics.fail_from_now();

        assert!(fx.sessions.end_session().await.was_active);
        assert!(fx.rule_hosts().await.is_empty());
        assert_eq!(
            fx.dispatcher.messages().last().map(|(_, m)| m.clone()),
            Some(TabMessage::StopBlocking)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timer_ends_session() {
        let fx = Fixture::new();
        fx.sessions.start_session("rust", 1).await.unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(!fx.sessions.is_active());
        assert_eq!(fx.analytics.ends(), 1);
        assert!(fx.store.get().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_session_cancels_old_timer() {
        let fx = Fixture::new();
        fx.sessions.start_session("first", 1).await.unwrap();
        fx.sessions.start_session("second", 10).await.unwrap();

        tokio::time::sleep(Duration::from_secs(90)).await;

        let current = fx.sessions.current().unwrap();
        assert_eq!(current.task_description, "second");
        assert_eq!(fx.analytics.ends(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_end_cancels_timer() {
        let fx = Fixture::new();
        fx.sessions.start_session("rust", 1).await.unwrap();
        fx.sessions.end_session().await;

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fx.analytics.ends(), 1);
    }

    #[tokio::test]
    async fn restore_resumes_running_session() {
        let fx = Fixture::new();
        let session = Session::new("rust", 60, Utc::now() - chrono::Duration::minutes(10));
        fx.store.put(session.clone());

        let outcome = fx.sessions.restore().await.unwrap();
        assert_eq!(outcome, RestoreOutcome::Resumed(session));
        assert!(fx.sessions.is_active());
        assert_eq!(fx.rule_hosts().await, vec!["reddit.com"]);
        let remaining = fx.sessions.remaining_minutes();
        assert!(remaining > 0 && remaining <= 50);
    }

    #[tokio::test]
    async fn restore_expired_session_cleans_up() {
        let fx = Fixture::new();
        fx.rules.apply_blocked_hostnames(&["reddit.com"]).await.unwrap();
        let session = Session::new("rust", 30, Utc::now() - chrono::Duration::hours(2));
        fx.store.put(session);

        let outcome = fx.sessions.restore().await.unwrap();
        assert_eq!(outcome, RestoreOutcome::Expired);
        assert!(!fx.sessions.is_active());
        assert!(fx.store.get().is_none());
        assert!(fx.rule_hosts().await.is_empty());
        assert_eq!(fx.analytics.ends(), 1);
    }

    #[tokio::test]
    async fn restore_without_record_clears_rules() {
        let fx = Fixture::new();
        fx.rules.apply_blocked_hostnames(&["reddit.com"]).await.unwrap();

        assert_eq!(fx.sessions.restore().await.unwrap(), RestoreOutcome::NoSession);
        assert!(fx.rule_hosts().await.is_empty());
    }
}
