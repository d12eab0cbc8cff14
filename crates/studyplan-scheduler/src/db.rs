use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::Result;

/// Initialise the planner schema in `conn`.
///
/// Creates the `tasks` table (idempotent) with indexes for the three hot
/// queries: overlap checks by user + slot, deadline scans and status scans.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tasks (
            id               TEXT    NOT NULL PRIMARY KEY,
            user_id          TEXT    NOT NULL,
            title            TEXT    NOT NULL,
            kind             TEXT    NOT NULL DEFAULT 'assignment',
            deadline         TEXT,               -- ISO-8601 or NULL
            estimated_hours  REAL    NOT NULL DEFAULT 1,
            status           TEXT    NOT NULL DEFAULT 'pending',
            priority         TEXT    NOT NULL DEFAULT 'medium',
            scheduled_start  TEXT,               -- ISO-8601 or NULL
            scheduled_end    TEXT,               -- ISO-8601 or NULL
            actual_hours     REAL    NOT NULL DEFAULT 0,
            version          INTEGER NOT NULL DEFAULT 0,
            created_at       TEXT    NOT NULL,
            updated_at       TEXT    NOT NULL,
            CHECK ((scheduled_start IS NULL) = (scheduled_end IS NULL)),
            CHECK (scheduled_start IS NULL OR scheduled_start < scheduled_end)
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_tasks_user_schedule
            ON tasks (user_id, scheduled_start, scheduled_end);
        CREATE INDEX IF NOT EXISTS idx_tasks_user_deadline
            ON tasks (user_id, deadline);
        CREATE INDEX IF NOT EXISTS idx_tasks_user_status
            ON tasks (user_id, status);
        ",
    )?;
    Ok(())
}

/// Fixed-width UTC timestamp so text comparison in SQL matches time order.
pub(crate) fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}
