//! Completed session history.

use chrono::{DateTime, Local, NaiveDate, Utc};
use focus_core::Session;
use rusqlite::{params, Connection};

use super::{parse_date, parse_time, DATE_FORMAT};
use crate::error::Result;
use crate::models::SessionHistoryEntry;

/// Entries kept after each insert.
pub const MAX_HISTORY_ENTRIES: i64 = 100;

/// Local calendar day containing `at`.
pub fn local_date(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Local).date_naive()
}

/// Repository for completed sessions.
pub struct HistoryRepo;

impl HistoryRepo {
    /// Appends a completed session and trims the history.
    pub fn insert(conn: &Connection, session: &Session, ended_at: DateTime<Utc>) -> Result<i64> {
        let actual = (ended_at - session.start_time).num_minutes().max(0);
        conn.execute(
            "INSERT INTO session_history
                (task_description, start_time, end_time, duration_minutes,
                 actual_duration_minutes, local_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.task_description,
                session.start_time.to_rfc3339(),
                session.end_time.to_rfc3339(),
                session.duration_minutes,
                actual,
                local_date(session.start_time).format(DATE_FORMAT).to_string(),
            ],
        )?;
        let id = conn.last_insert_rowid();

        conn.execute(
            "DELETE FROM session_history WHERE id NOT IN (
                SELECT id FROM session_history ORDER BY id DESC LIMIT ?1
             )",
            [MAX_HISTORY_ENTRIES],
        )?;

        Ok(id)
    }

    /// Most recent entries first.
    pub fn get_recent(conn: &Connection, limit: i64) -> Result<Vec<SessionHistoryEntry>> {
        let mut stmt = conn.prepare(
            "SELECT id, task_description, start_time, end_time, duration_minutes,
                    actual_duration_minutes, local_date
             FROM session_history ORDER BY id DESC LIMIT ?1",
        )?;

        let entries = stmt
            .query_map([limit], |row| {
                let start: String = row.get(2)?;
                let end: String = row.get(3)?;
                let date: String = row.get(6)?;
                Ok(SessionHistoryEntry {
                    id: row.get(0)?,
                    task_description: row.get(1)?,
                    start_time: parse_time(2, &start)?,
                    end_time: parse_time(3, &end)?,
                    duration_minutes: row.get(4)?,
                    actual_duration_minutes: row.get(5)?,
                    local_date: parse_date(6, &date)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }

    /// Sessions that started on `date`.
    pub fn count_on(conn: &Connection, date: NaiveDate) -> Result<u32> {
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM session_history WHERE local_date = ?1",
            [date.format(DATE_FORMAT).to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM session_history", [], |row| row.get(0))?;
        Ok(count)
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

    #[test]
    fn insert_records_actual_duration() {
        let conn = setup_db();
        let start = Utc::now() - chrono::Duration::minutes(20);
        let session = Session::new("rust", 45, start);
        HistoryRepo::insert(&conn, &session, start + chrono::Duration::seconds(12 * 60 + 30)).unwrap();

        let entries = HistoryRepo::get_recent(&conn, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].duration_minutes, 45);
        assert_eq!(entries[0].actual_duration_minutes, 12);
        assert_eq!(entries[0].local_date, local_date(start));
    }

    #[test]
    fn count_on_uses_start_day() {
        let conn = setup_db();
        let now = Utc::now();
        let yesterday = now - chrono::Duration::days(1);

        HistoryRepo::insert(&conn, &Session::new("a", 10, now), now).unwrap();
        HistoryRepo::insert(&conn, &Session::new("b", 10, now), now).unwrap();
        HistoryRepo::insert(&conn, &Session::new("c", 10, yesterday), yesterday).unwrap();

        assert_eq!(HistoryRepo::count_on(&conn, local_date(now)).unwrap(), 2);
        assert_eq!(HistoryRepo::count_on(&conn, local_date(yesterday)).unwrap(), 1);
    }

    #[test]
    fn history_is_trimmed() {
        let conn = setup_db();
        let now = Utc::now();
        for i in 0..(MAX_HISTORY_ENTRIES + 5) {
            HistoryRepo::insert(&conn, &Session::new(format!("task {i}"), 10, now), now).unwrap();
        }

        assert_eq!(HistoryRepo::count(&conn).unwrap(), MAX_HISTORY_ENTRIES);
        let newest = HistoryRepo::get_recent(&conn, 1).unwrap();
        assert_eq!(newest[0].task_description, format!("task {}", MAX_HISTORY_ENTRIES + 4));
    }
}
