use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, instrument};

use crate::db::{fmt_ts, init_db, parse_ts};
use crate::error::{PlannerError, Result};
use crate::types::{Interval, Task};

/// Persistence seam for the planner.
///
/// Every query is scoped to one user. `insert` and `save` are the only
/// writes; both refuse a slot that overlaps another non-cancelled task of
/// the same user, and `save` additionally refuses a snapshot whose
/// `version` no longer matches the stored row.
pub trait TaskStore: Send + Sync {
    /// Add a new task. Fails with `Conflict` if its slot is already taken.
    fn insert(&self, task: &Task) -> Result<Task>;

    /// Look up a task owned by `user_id`; `None` if missing or owned by someone else.
    fn find_by_id(&self, user_id: &str, task_id: &str) -> Result<Option<Task>>;

    /// Non-cancelled scheduled tasks whose slot overlaps `interval`, by start time.
    fn find_overlapping(
        &self,
        user_id: &str,
        interval: &Interval,
        exclude_task_id: Option<&str>,
    ) -> Result<Vec<Task>>;

    /// Tasks whose `scheduled_start` lies in `[from, until)`, by start time.
    fn find_scheduled_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Task>>;

    /// Pending / in-progress tasks without a slot, oldest first.
    fn find_unscheduled(&self, user_id: &str) -> Result<Vec<Task>>;

    /// Pending / in-progress tasks whose slot started before `from` but whose
    /// deadline is at or after `from`, earliest deadline first.
    fn find_missed(&self, user_id: &str, from: DateTime<Utc>) -> Result<Vec<Task>>;

    /// Tasks scheduled in, or due in, `[from, until)`.
    fn find_for_week(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Task>>;

    /// All tasks of a user, oldest first.
    fn list_for_user(&self, user_id: &str) -> Result<Vec<Task>>;

    /// Optimistic write of the whole snapshot. Returns the stored task with
    /// its bumped `version`.
    fn save(&self, task: &Task) -> Result<Task>;
}

const TASK_COLUMNS: &str = "id, user_id, title, kind, deadline, estimated_hours, status,
     priority, scheduled_start, scheduled_end, actual_hours, version, created_at, updated_at";

/// SQLite-backed [`TaskStore`].
///
/// Wraps a single connection in a `Mutex`, like the other managers. Writes
/// run inside an IMMEDIATE transaction so the overlap guard and the write
/// are atomic even when several processes share the database file.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Wrap an open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open (or create) the database file at `path` in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TaskStore for SqliteTaskStore {
    #[instrument(skip(self, task), fields(task_id = %task.id, user_id = %task.user_id))]
    fn insert(&self, task: &Task) -> Result<Task> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        guard_overlap(&tx, task)?;

        tx.execute(
            &format!(
                "INSERT INTO tasks ({TASK_COLUMNS})
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)"
            ),
            rusqlite::params![
                task.id,
                task.user_id,
                task.title,
                task.kind.to_string(),
                task.deadline.map(fmt_ts),
                task.estimated_hours,
                task.status.to_string(),
                task.priority.to_string(),
                task.scheduled_start.map(fmt_ts),
                task.scheduled_end.map(fmt_ts),
                task.actual_hours,
                task.version as i64,
                fmt_ts(task.created_at),
                fmt_ts(task.updated_at),
            ],
        )?;
        tx.commit()?;
        debug!("task inserted");
        Ok(task.clone())
    }

    fn find_by_id(&self, user_id: &str, task_id: &str) -> Result<Option<Task>> {
        let conn = self.lock();
        let mut tasks = query_tasks(
            &conn,
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2"),
            rusqlite::params![task_id, user_id],
        )?;
        Ok(tasks.pop())
    }

    fn find_overlapping(
        &self,
        user_id: &str,
        interval: &Interval,
        exclude_task_id: Option<&str>,
    ) -> Result<Vec<Task>> {
        let conn = self.lock();
        overlapping(&conn, user_id, interval, exclude_task_id)
    }

    fn find_scheduled_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let conn = self.lock();
        query_tasks(
            &conn,
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE user_id = ?1 AND scheduled_start >= ?2 AND scheduled_start < ?3
                 ORDER BY scheduled_start"
            ),
            rusqlite::params![user_id, fmt_ts(from), fmt_ts(until)],
        )
    }

    fn find_unscheduled(&self, user_id: &str) -> Result<Vec<Task>> {
        let conn = self.lock();
        query_tasks(
            &conn,
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE user_id = ?1 AND status IN ('pending', 'in-progress')
                   AND scheduled_start IS NULL
                 ORDER BY created_at"
            ),
            rusqlite::params![user_id],
        )
    }

    fn find_missed(&self, user_id: &str, from: DateTime<Utc>) -> Result<Vec<Task>> {
        let conn = self.lock();
        query_tasks(
            &conn,
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE user_id = ?1 AND status IN ('pending', 'in-progress')
                   AND scheduled_start < ?2 AND deadline >= ?2
                 ORDER BY deadline"
            ),
            rusqlite::params![user_id, fmt_ts(from)],
        )
    }

    fn find_for_week(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let conn = self.lock();
        query_tasks(
            &conn,
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE user_id = ?1
                   AND ((scheduled_start >= ?2 AND scheduled_start < ?3)
                        OR (deadline >= ?2 AND deadline < ?3))
                 ORDER BY scheduled_start, deadline"
            ),
            rusqlite::params![user_id, fmt_ts(from), fmt_ts(until)],
        )
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<Task>> {
        let conn = self.lock();
        query_tasks(
            &conn,
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 ORDER BY created_at"),
            rusqlite::params![user_id],
        )
    }

    #[instrument(skip(self, task), fields(task_id = %task.id, version = task.version))]
    fn save(&self, task: &Task) -> Result<Task> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        guard_overlap(&tx, task)?;

        let now = Utc::now();
        let n = tx.execute(
            "UPDATE tasks SET title=?1, kind=?2, deadline=?3, estimated_hours=?4, status=?5,
                 priority=?6, scheduled_start=?7, scheduled_end=?8, actual_hours=?9,
                 version = version + 1, updated_at=?10
             WHERE id=?11 AND user_id=?12 AND version=?13",
            rusqlite::params![
                task.title,
                task.kind.to_string(),
                task.deadline.map(fmt_ts),
                task.estimated_hours,
                task.status.to_string(),
                task.priority.to_string(),
                task.scheduled_start.map(fmt_ts),
                task.scheduled_end.map(fmt_ts),
                task.actual_hours,
                fmt_ts(now),
                task.id,
                task.user_id,
                task.version as i64,
            ],
        )?;

        if n == 0 {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?1 AND user_id = ?2)",
                rusqlite::params![task.id, task.user_id],
                |row| row.get(0),
            )?;
            return Err(if exists {
                PlannerError::Stale {
                    id: task.id.clone(),
                }
            } else {
                PlannerError::NotFound {
                    id: task.id.clone(),
                }
            });
        }
        tx.commit()?;

        let mut saved = task.clone();
        saved.version += 1;
        saved.updated_at = now;
        debug!(new_version = saved.version, "task saved");
        Ok(saved)
    }
}

/// Refuse to write a slot that another live task of the same user occupies.
fn guard_overlap(conn: &Connection, task: &Task) -> Result<()> {
    if task.status == crate::types::TaskStatus::Cancelled {
        return Ok(());
    }
    let Some(interval) = task.interval() else {
        if task.scheduled_start.is_some() || task.scheduled_end.is_some() {
            return Err(PlannerError::Validation(format!(
                "task {} has a malformed schedule",
                task.id
            )));
        }
        return Ok(());
    };
    let conflicts = overlapping(conn, &task.user_id, &interval, Some(&task.id))?;
    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(PlannerError::Conflict { conflicts })
    }
}

fn overlapping(
    conn: &Connection,
    user_id: &str,
    interval: &Interval,
    exclude_task_id: Option<&str>,
) -> Result<Vec<Task>> {
    query_tasks(
        conn,
        &format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE user_id = ?1 AND status != 'cancelled'
               AND scheduled_start IS NOT NULL
               AND scheduled_start < ?3 AND scheduled_end > ?2
               AND (?4 IS NULL OR id != ?4)
             ORDER BY scheduled_start"
        ),
        rusqlite::params![
            user_id,
            fmt_ts(interval.start()),
            fmt_ts(interval.end()),
            exclude_task_id
        ],
    )
}

fn query_tasks(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params, row_to_task)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(decode_error)
}

fn decode_error(e: rusqlite::Error) -> PlannerError {
    match e {
        rusqlite::Error::FromSqlConversionFailure(idx, _, err) => {
            PlannerError::Corrupt(format!("column {idx}: {err}"))
        }
        other => PlannerError::Store(other),
    }
}

/// Map a SELECT row (column order from TASK_COLUMNS) to a Task.
fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        kind: parse_col(row, 3, |s| s.parse())?,
        deadline: parse_opt_ts(row, 4)?,
        estimated_hours: row.get(5)?,
        status: parse_col(row, 6, |s| s.parse())?,
        priority: parse_col(row, 7, |s| s.parse())?,
        scheduled_start: parse_opt_ts(row, 8)?,
        scheduled_end: parse_opt_ts(row, 9)?,
        actual_hours: row.get(10)?,
        version: row.get::<_, i64>(11)? as u64,
        created_at: parse_col(row, 12, parse_ts)?,
        updated_at: parse_col(row, 13, parse_ts)?,
    })
}

fn parse_col<T, E>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    parse: impl FnOnce(&str) -> std::result::Result<T, E>,
) -> rusqlite::Result<T>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let raw: String = row.get(idx)?;
    parse(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn parse_opt_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        parse_ts(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
        })
    })
    .transpose()
}
