//! SQLite-backed implementations of the core collaborator traits.
//!
//! Queries are small and local, so they run inline on the calling task.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use focus_core::{
    BlockRule, Entitlements, RuleStore, RuleStoreError, Session, SessionAnalytics, SessionStore,
    Settings, SettingsError, SettingsSource, StoreError, Subscription,
};

use crate::repository::history::local_date;
use crate::Database;

#[async_trait]
impl SessionStore for Database {
    async fn load(&self) -> Result<Option<Session>, StoreError> {
        Ok(self.load_session()?)
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        Ok(self.save_session(session)?)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.clear_session()?;
        Ok(())
    }
}

#[async_trait]
impl Entitlements for Database {
    async fn subscription(&self) -> Result<Subscription, StoreError> {
        Ok(Database::subscription(self)?)
    }

    async fn sessions_today(&self, now: DateTime<Utc>) -> Result<u32, StoreError> {
        Ok(self.sessions_on(local_date(now))?)
    }
}

#[async_trait]
impl SessionAnalytics for Database {
    async fn record_start(&self, session: &Session) -> Result<(), StoreError> {
        self.record_session_start(session)?;
        Ok(())
    }

    async fn record_end(&self, session: &Session, ended_at: DateTime<Utc>) -> Result<(), StoreError> {
        let stats = self.record_session_end(session, ended_at)?;
        tracing::debug!(
            streak = stats.focus_streak,
            total_minutes = stats.total_focus_minutes,
            "Recorded session end"
        );
        Ok(())
    }
}

#[async_trait]
impl RuleStore for Database {
    async fn installed_rules(&self) -> Result<Vec<BlockRule>, RuleStoreError> {
        Ok(Database::installed_rules(self)?)
    }

    async fn update_rules(
        &self,
        remove_ids: &[u32],
        add_rules: &[BlockRule],
    ) -> Result<(), RuleStoreError> {
        Ok(self.replace_rules(remove_ids, add_rules)?)
    }
}

#[async_trait]
impl SettingsSource for Database {
    async fn load(&self) -> Result<Settings, SettingsError> {
        Ok(self.load_settings()?)
    }
}
