//! Configuration repository.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

/// Key under which the settings document is stored.
pub const SETTINGS_KEY: &str = "settings";

/// Repository for key-value configuration.
pub struct ConfigRepo;

impl ConfigRepo {
    /// Get a configuration value.
    pub fn get(conn: &Connection, key: &str) -> Result<Option<serde_json::Value>> {
        let raw: Option<String> = conn
            .query_row("SELECT value FROM config WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Set a configuration value (insert or update).
    pub fn set(conn: &Connection, key: &str, value: &serde_json::Value) -> Result<()> {
        let value_json = serde_json::to_string(value)?;

        conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value_json],
        )?;

        Ok(())
    }

    /// Delete a configuration value.
    pub fn delete(conn: &Connection, key: &str) -> Result<bool> {
        let deleted = conn.execute("DELETE FROM config WHERE key = ?1", [key])?;
        Ok(deleted > 0)
    }

    /// Get a typed configuration value, or `default` if missing.
    pub fn get_or_default<T: serde::de::DeserializeOwned>(
        conn: &Connection,
        key: &str,
        default: T,
    ) -> Result<T> {
        match Self::get(conn, key)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;
    use serde_json::json;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn set_overwrites_existing_key() {
        let conn = setup_db();

        ConfigRepo::set(&conn, "key", &json!("original")).unwrap();
        ConfigRepo::set(&conn, "key", &json!("updated")).unwrap();

        assert_eq!(ConfigRepo::get(&conn, "key").unwrap(), Some(json!("updated")));
    }

    #[test]
    fn missing_key_is_none() {
        let conn = setup_db();
        assert!(ConfigRepo::get(&conn, "nonexistent").unwrap().is_none());
        assert!(!ConfigRepo::delete(&conn, "nonexistent").unwrap());
    }

    #[test]
    fn typed_get_falls_back_to_default() {
        let conn = setup_db();

        let value: i32 = ConfigRepo::get_or_default(&conn, "missing", 42).unwrap();
        assert_eq!(value, 42);

        ConfigRepo::set(&conn, "existing", &json!(100)).unwrap();
        let value: i32 = ConfigRepo::get_or_default(&conn, "existing", 42).unwrap();
        assert_eq!(value, 100);
    }

    #[test]
    fn corrupt_value_is_an_error() {
        let conn = setup_db();
        conn.execute(
            "INSERT INTO config (key, value) VALUES ('bad', '{not json')",
            [],
        )
        .unwrap();
        assert!(ConfigRepo::get(&conn, "bad").is_err());
    }
}
