//! High-level database interface.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use directories::ProjectDirs;
use focus_core::{BlockRule, Session, Settings, Subscription};
use tracing::info;

use crate::error::{Result, StorageError};
use crate::models::{FocusStats, SessionHistoryEntry};
use crate::pool::ConnectionPool;
use crate::repository::config::SETTINGS_KEY;
use crate::repository::history::local_date;
use crate::repository::{
    ConfigRepo, HistoryRepo, RulesRepo, SessionRepo, StatsRepo, SubscriptionRepo,
};

/// High-level database interface for Focus Guard.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: ConnectionPool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Opens the database in the default app data directory.
    pub fn new() -> Result<Self> {
        Self::with_path(Self::default_db_path()?)
    }

    /// Opens the database at a specific path.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Opening database");
        let pool = ConnectionPool::new(&path)?;

        Ok(Self { pool })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let pool = ConnectionPool::in_memory()?;
        Ok(Self { pool })
    }

    /// Get the default database path.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "focusguard", "focus-guard")
            .ok_or_else(|| StorageError::Config("Could not determine app data directory".into()))?;

        Ok(proj_dirs.data_dir().join("focus-guard.db"))
    }

    // === Settings ===

    /// Loads settings with defaults merged in.
    ///
    /// Deprecated values are migrated and written back.
    pub fn load_settings(&self) -> Result<Settings> {
        let conn = self.pool.get()?;
        let mut settings: Settings =
            ConfigRepo::get_or_default(&conn, SETTINGS_KEY, Settings::default())?;
        if settings.migrate() {
            info!("Migrated deprecated settings");
            ConfigRepo::set(&conn, SETTINGS_KEY, &serde_json::to_value(&settings)?)?;
        }
        Ok(settings)
    }

    /// Migrates and stores `settings`, returning what was stored.
    pub fn save_settings(&self, mut settings: Settings) -> Result<Settings> {
        settings.migrate();
        let conn = self.pool.get()?;
        ConfigRepo::set(&conn, SETTINGS_KEY, &serde_json::to_value(&settings)?)?;
        Ok(settings)
    }

    // === Active session ===

    pub fn save_session(&self, session: &Session) -> Result<()> {
        let conn = self.pool.get()?;
        SessionRepo::save(&conn, session)
    }

    pub fn load_session(&self) -> Result<Option<Session>> {
        let conn = self.pool.get()?;
        SessionRepo::load(&conn)
    }

    pub fn clear_session(&self) -> Result<bool> {
        let conn = self.pool.get()?;
        SessionRepo::clear(&conn)
    }

    // === Network rules ===

    pub fn installed_rules(&self) -> Result<Vec<BlockRule>> {
        let conn = self.pool.get()?;
        RulesRepo::get_all(&conn)
    }

    /// Atomically removes `remove_ids` and adds `add`.
    pub fn replace_rules(&self, remove_ids: &[u32], add: &[BlockRule]) -> Result<()> {
        let conn = self.pool.get()?;
        RulesRepo::replace(&conn, remove_ids, add)
    }

    // === Entitlements ===

    /// The stored subscription. Free when none was ever written.
    pub fn subscription(&self) -> Result<Subscription> {
        let conn = self.pool.get()?;
        Ok(SubscriptionRepo::get(&conn)?.unwrap_or_default())
    }

    pub fn set_subscription(&self, subscription: &Subscription) -> Result<()> {
        let conn = self.pool.get()?;
        SubscriptionRepo::set(&conn, subscription)
    }

    /// Completed sessions that started on the local day `date`.
    pub fn sessions_on(&self, date: NaiveDate) -> Result<u32> {
        let conn = self.pool.get()?;
        HistoryRepo::count_on(&conn, date)
    }

    // === Analytics ===

    /// Start hook. Grants the trial on the very first session.
    ///
    /// Returns true if a trial was started.
    pub fn record_session_start(&self, session: &Session) -> Result<bool> {
        let conn = self.pool.get()?;
        if HistoryRepo::count(&conn)? > 0 || SubscriptionRepo::get(&conn)?.is_some() {
            return Ok(false);
        }
        let trial = Subscription::trial(session.start_time);
        SubscriptionRepo::set(&conn, &trial)?;
        info!(trial_end = ?trial.trial_end, "Started trial");
        Ok(true)
    }

    /// End hook. Appends history and updates the focus stats.
    pub fn record_session_end(&self, session: &Session, ended_at: DateTime<Utc>) -> Result<FocusStats> {
        let conn = self.pool.get()?;
        let tx = conn.unchecked_transaction()?;
        HistoryRepo::insert(&tx, session, ended_at)?;
        let stats = StatsRepo::record_session(&tx, local_date(ended_at), session.duration_minutes)?;
        tx.commit()?;
        Ok(stats)
    }

    pub fn recent_sessions(&self, limit: i64) -> Result<Vec<SessionHistoryEntry>> {
        let conn = self.pool.get()?;
        HistoryRepo::get_recent(&conn, limit)
    }

    pub fn focus_stats(&self) -> Result<FocusStats> {
        let conn = self.pool.get()?;
        StatsRepo::get(&conn)
    }
}
