//! Focus statistics: totals, streak, and minutes per day.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use super::{parse_date, DATE_FORMAT};
use crate::error::Result;
use crate::models::FocusStats;

/// Repository for focus statistics.
pub struct StatsRepo;

impl StatsRepo {
    pub fn get(conn: &Connection) -> Result<FocusStats> {
        let row = conn
            .query_row(
                "SELECT total_focus_minutes, focus_streak, last_session_date
                 FROM focus_stats WHERE id = 1",
                [],
                |row| {
                    let last: Option<String> = row.get(2)?;
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        last.map(|d| parse_date(2, &d)).transpose()?,
                    ))
                },
            )
            .optional()?;

        let mut stmt = conn.prepare("SELECT date, minutes FROM daily_focus ORDER BY date ASC")?;
        let daily_focus_minutes = stmt
            .query_map([], |row| {
                let date: String = row.get(0)?;
                Ok((parse_date(0, &date)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

        let (total_focus_minutes, focus_streak, last_session_date) = row.unwrap_or((0, 0, None));
        Ok(FocusStats {
            total_focus_minutes,
            focus_streak,
            last_session_date,
            daily_focus_minutes,
        })
    }

    /// Adds a completed session of `minutes` planned minutes on `today`.
    ///
    /// The streak grows when the previous session was on the day before,
    /// stays on the same day, and restarts at 1 otherwise.
    pub fn record_session(conn: &Connection, today: NaiveDate, minutes: u32) -> Result<FocusStats> {
        let current = Self::get(conn)?;
        let streak = match current.last_session_date {
            Some(last) if last == today => current.focus_streak.max(1),
            Some(last) if today.signed_duration_since(last).num_days() == 1 => {
                current.focus_streak + 1
            }
            _ => 1,
        };
        let minutes = i64::from(minutes);
        let today_str = today.format(DATE_FORMAT).to_string();

        conn.execute(
            "INSERT OR REPLACE INTO focus_stats (id, total_focus_minutes, focus_streak, last_session_date)
             VALUES (1, ?1, ?2, ?3)",
            params![current.total_focus_minutes + minutes, streak, today_str],
        )?;
        conn.execute(
            "INSERT INTO daily_focus (date, minutes) VALUES (?1, ?2)
             ON CONFLICT(date) DO UPDATE SET minutes = minutes + ?2",
            params![today_str, minutes],
        )?;

        Self::get(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn empty_stats() {
        let conn = setup_db();
        assert_eq!(StatsRepo::get(&conn).unwrap(), FocusStats::default());
    }

    #[test]
    fn streak_grows_on_consecutive_days() {
        let conn = setup_db();
        StatsRepo::record_session(&conn, day(1), 30).unwrap();
        StatsRepo::record_session(&conn, day(1), 15).unwrap();
        let stats = StatsRepo::record_session(&conn, day(2), 60).unwrap();

        assert_eq!(stats.focus_streak, 2);
        assert_eq!(stats.total_focus_minutes, 105);
        assert_eq!(stats.minutes_on(day(1)), 45);
        assert_eq!(stats.minutes_on(day(2)), 60);
        assert_eq!(stats.last_session_date, Some(day(2)));
    }

    #[test]
    fn gap_resets_streak() {
        let conn = setup_db();
        StatsRepo::record_session(&conn, day(1), 30).unwrap();
        StatsRepo::record_session(&conn, day(2), 30).unwrap();
        let stats = StatsRepo::record_session(&conn, day(5), 30).unwrap();
        assert_eq!(stats.focus_streak, 1);
    }
}
