//! Installed network block rules.

use focus_core::network_rules::ResourceType;
use focus_core::BlockRule;
use rusqlite::types::Type;
use rusqlite::{params, Connection};

use crate::error::Result;

/// Repository for the dynamic rule set.
pub struct RulesRepo;

impl RulesRepo {
    /// All installed rules, ordered by ID.
    pub fn get_all(conn: &Connection) -> Result<Vec<BlockRule>> {
        let mut stmt = conn.prepare(
            "SELECT id, hostname, regex_filter, priority, resource_types
             FROM network_rules ORDER BY id ASC",
        )?;

        let rules = stmt
            .query_map([], |row| {
                let types: String = row.get(4)?;
                let resource_types: Vec<ResourceType> = serde_json::from_str(&types)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
                Ok(BlockRule {
                    id: row.get(0)?,
                    hostname: row.get(1)?,
                    regex_filter: row.get(2)?,
                    priority: row.get(3)?,
                    resource_types,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rules)
    }

    /// Removes `remove_ids` and inserts `add` in one transaction.
    ///
    /// Nothing changes if any statement fails, including an insert that
    /// collides with a rule that was not removed.
    pub fn replace(conn: &Connection, remove_ids: &[u32], add: &[BlockRule]) -> Result<()> {
        let tx = conn.unchecked_transaction()?;
        {
            let mut delete = tx.prepare("DELETE FROM network_rules WHERE id = ?1")?;
            for id in remove_ids {
                delete.execute([id])?;
            }

            let mut insert = tx.prepare(
                "INSERT INTO network_rules (id, hostname, regex_filter, priority, resource_types)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for rule in add {
                insert.execute(params![
                    rule.id,
                    rule.hostname,
                    rule.regex_filter,
                    rule.priority,
                    serde_json::to_string(&rule.resource_types)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
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
    fn replace_swaps_rules() {
        let conn = setup_db();
        let first = vec![
            BlockRule::for_hostname(1000, "reddit.com"),
            BlockRule::for_hostname(1001, "twitter.com"),
        ];
        RulesRepo::replace(&conn, &[], &first).unwrap();
        assert_eq!(RulesRepo::get_all(&conn).unwrap(), first);

        let second = vec![BlockRule::for_hostname(1000, "tiktok.com")];
        RulesRepo::replace(&conn, &[1000, 1001], &second).unwrap();
        assert_eq!(RulesRepo::get_all(&conn).unwrap(), second);
    }

    #[test]
    fn failed_replace_leaves_rules_untouched() {
        let conn = setup_db();
        let installed = vec![
            BlockRule::for_hostname(1000, "reddit.com"),
            BlockRule::for_hostname(1001, "twitter.com"),
        ];
        RulesRepo::replace(&conn, &[], &installed).unwrap();

        // 1001 is not removed, so inserting it again violates the primary key.
        let result = RulesRepo::replace(
            &conn,
            &[1000],
            &[
                BlockRule::for_hostname(1000, "tiktok.com"),
                BlockRule::for_hostname(1001, "youtube.com"),
            ],
        );
        assert!(result.is_err());
        assert_eq!(RulesRepo::get_all(&conn).unwrap(), installed);
    }
}
