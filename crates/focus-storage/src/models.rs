//! Data models for storage.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A completed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHistoryEntry {
    /// Unique identifier.
    pub id: i64,
    pub task_description: String,
    pub start_time: DateTime<Utc>,
    /// Planned end.
    pub end_time: DateTime<Utc>,
    pub duration_minutes: u32,
    /// Whole minutes between start and the actual end.
    pub actual_duration_minutes: u32,
    /// Local calendar day the session started on.
    pub local_date: NaiveDate,
}

/// Aggregated focus statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusStats {
    /// Sum of planned minutes over completed sessions.
    pub total_focus_minutes: i64,
    /// Consecutive local days with at least one completed session.
    pub focus_streak: i64,
    pub last_session_date: Option<NaiveDate>,
    /// Planned minutes per local day.
    pub daily_focus_minutes: BTreeMap<NaiveDate, i64>,
}

impl FocusStats {
    /// Minutes recorded for `date`.
    pub fn minutes_on(&self, date: NaiveDate) -> i64 {
        self.daily_focus_minutes.get(&date).copied().unwrap_or(0)
    }
}
