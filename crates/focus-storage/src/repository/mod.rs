//! Database repositories for each table.

pub mod config;
pub mod history;
pub mod rules;
pub mod session;
pub mod stats;
pub mod subscription;

pub use config::ConfigRepo;
pub use history::{HistoryRepo, MAX_HISTORY_ENTRIES};
pub use rules::RulesRepo;
pub use session::SessionRepo;
pub use stats::StatsRepo;
pub use subscription::SubscriptionRepo;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;

/// Parses an RFC 3339 column.
pub(crate) fn parse_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parses a `YYYY-MM-DD` column.
pub(crate) fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
