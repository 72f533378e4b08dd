//! Active session record.

use focus_core::Session;
use rusqlite::{params, Connection, OptionalExtension};

use super::parse_time;
use crate::error::Result;

/// Repository for the single persisted session.
pub struct SessionRepo;

impl SessionRepo {
    /// Stores `session`, replacing any previous record.
    pub fn save(conn: &Connection, session: &Session) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO active_session
                (id, task_description, start_time, end_time, duration_minutes, active)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)",
            params![
                session.task_description,
                session.start_time.to_rfc3339(),
                session.end_time.to_rfc3339(),
                session.duration_minutes,
                session.active,
            ],
        )?;
        Ok(())
    }

    pub fn load(conn: &Connection) -> Result<Option<Session>> {
        let session = conn
            .query_row(
                "SELECT task_description, start_time, end_time, duration_minutes, active
                 FROM active_session WHERE id = 1",
                [],
                |row| {
                    let start: String = row.get(1)?;
                    let end: String = row.get(2)?;
                    Ok(Session {
                        task_description: row.get(0)?,
                        start_time: parse_time(1, &start)?,
                        end_time: parse_time(2, &end)?,
                        duration_minutes: row.get(3)?,
                        active: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    /// Removes the record. Returns true if one existed.
    pub fn clear(conn: &Connection) -> Result<bool> {
        let deleted = conn.execute("DELETE FROM active_session", [])?;
        Ok(deleted > 0)
    }
}
