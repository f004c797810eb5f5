use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;
use uuid::Uuid;

use crate::error::Result;
use crate::types::DailyTokenUsage;

/// Returns today's usage row, creating it with zero counters if absent
/// (`get_daily_usage`). At most one row exists per (user, date) —
/// invariant 3 of the data model — enforced by the schema's unique index.
#[instrument(skip(conn))]
pub fn get_daily_usage(conn: &Connection, user_id: &str) -> Result<DailyTokenUsage> {
    let today = Utc::now().date_naive();
    if let Some(usage) = query_usage(conn, user_id, today)? {
        return Ok(usage);
    }

    conn.execute(
        "INSERT OR IGNORE INTO daily_token_usage (id, user_id, usage_date, input_tokens_used, output_tokens_used)
         VALUES (?1, ?2, ?3, 0, 0)",
        params![Uuid::now_v7().to_string(), user_id, today.to_string()],
    )?;

    query_usage(conn, user_id, today)?.ok_or_else(|| crate::error::StoreError::NotFound {
        kind: "daily_token_usage",
        id: format!("{user_id}:{today}"),
    })
}

/// Atomically adds to today's counters, creating the row first if needed.
#[instrument(skip(conn))]
pub fn increment_token_usage(conn: &Connection, user_id: &str, input_delta: u64, output_delta: u64) -> Result<()> {
    get_daily_usage(conn, user_id)?;
    let today = Utc::now().date_naive();
    conn.execute(
        "UPDATE daily_token_usage
         SET input_tokens_used = input_tokens_used + ?1,
             output_tokens_used = output_tokens_used + ?2
         WHERE user_id = ?3 AND usage_date = ?4",
        params![input_delta as i64, output_delta as i64, user_id, today.to_string()],
    )?;
    Ok(())
}

/// Returns `true` if the user is within both daily token limits.
pub fn check_daily_limit(conn: &Connection, user_id: &str, input_limit: u64, output_limit: u64) -> Result<bool> {
    let usage = get_daily_usage(conn, user_id)?;
    Ok(usage.input_tokens_used < input_limit && usage.output_tokens_used < output_limit)
}

fn query_usage(conn: &Connection, user_id: &str, date: chrono::NaiveDate) -> Result<Option<DailyTokenUsage>> {
    conn.query_row(
        "SELECT user_id, usage_date, input_tokens_used, output_tokens_used
         FROM daily_token_usage WHERE user_id = ?1 AND usage_date = ?2",
        params![user_id, date.to_string()],
        |row| {
            let usage_date: String = row.get(1)?;
            Ok(DailyTokenUsage {
                user_id: row.get(0)?,
                date: chrono::NaiveDate::parse_from_str(&usage_date, "%Y-%m-%d").unwrap_or(date),
                input_tokens_used: row.get::<_, i64>(2)? as u64,
                output_tokens_used: row.get::<_, i64>(3)? as u64,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}
