//! Subscription record.

use chrono::{DateTime, Utc};
use focus_core::{Plan, Subscription};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use super::parse_time;
use crate::error::Result;

/// Database representation of a plan.
pub fn plan_as_str(plan: Plan) -> &'static str {
    match plan {
        Plan::None => "none",
        Plan::Trial => "trial",
        Plan::Free => "free",
        Plan::Premium => "premium",
    }
}

/// Parses a stored plan name.
pub fn parse_plan(s: &str) -> Option<Plan> {
    match s {
        "none" => Some(Plan::None),
        "trial" => Some(Plan::Trial),
        "free" => Some(Plan::Free),
        "premium" => Some(Plan::Premium),
        _ => None,
    }
}

fn parse_optional_time(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|raw| parse_time(idx, &raw)).transpose()
}

/// Repository for the subscription record.
pub struct SubscriptionRepo;

impl SubscriptionRepo {
    /// The stored subscription, if one was ever written.
    pub fn get(conn: &Connection) -> Result<Option<Subscription>> {
        let subscription = conn
            .query_row(
                "SELECT plan, trial_end, premium_end FROM subscription WHERE id = 1",
                [],
                |row| {
                    let plan: String = row.get(0)?;
                    let plan = parse_plan(&plan).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            0,
                            Type::Text,
                            format!("unknown plan '{plan}'").into(),
                        )
                    })?;
                    Ok(Subscription {
                        plan,
                        trial_end: parse_optional_time(1, row.get(1)?)?,
                        premium_end: parse_optional_time(2, row.get(2)?)?,
                    })
                },
            )
            .optional()?;
        Ok(subscription)
    }

    pub fn set(conn: &Connection, subscription: &Subscription) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO subscription (id, plan, trial_end, premium_end)
             VALUES (1, ?1, ?2, ?3)",
            params![
                plan_as_str(subscription.plan),
                subscription.trial_end.map(|t| t.to_rfc3339()),
                subscription.premium_end.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }
}
