//! In-memory [`TaskStore`] for tests and embedding.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::error::{PlannerError, Result};
use crate::store::TaskStore;
use crate::types::{Interval, Task, TaskStatus};

/// Vec-backed store with the same write guarantees as the SQLite store:
/// overlap guard on every write and optimistic versioning on `save`.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<Vec<Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, bypassing the overlap guard. Lets tests reproduce
    /// calendars that were corrupted before the guard existed.
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn select(&self, pred: impl Fn(&Task) -> bool) -> Vec<Task> {
        self.lock().iter().filter(|&t| pred(t)).cloned().collect()
    }
}

fn overlapping_in(
    tasks: &[Task],
    user_id: &str,
    interval: &Interval,
    exclude_task_id: Option<&str>,
) -> Vec<Task> {
    let mut hits: Vec<Task> = tasks
        .iter()
        .filter(|t| t.user_id == user_id && t.status != TaskStatus::Cancelled)
        .filter(|t| exclude_task_id != Some(t.id.as_str()))
        .filter(|t| t.interval().is_some_and(|iv| iv.overlaps(interval)))
        .cloned()
        .collect();
    hits.sort_by_key(|t| t.scheduled_start);
    hits
}

fn guard_overlap(tasks: &[Task], task: &Task) -> Result<()> {
    if task.status == TaskStatus::Cancelled {
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
    let conflicts = overlapping_in(tasks, &task.user_id, &interval, Some(&task.id));
    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(PlannerError::Conflict { conflicts })
    }
}

impl TaskStore for MemoryTaskStore {
    fn insert(&self, task: &Task) -> Result<Task> {
        let mut tasks = self.lock();
        if tasks.iter().any(|t| t.id == task.id) {
            return Err(PlannerError::Validation(format!(
                "task {} already exists",
                task.id
            )));
        }
        guard_overlap(&tasks, task)?;
        tasks.push(task.clone());
        Ok(task.clone())
    }

    fn find_by_id(&self, user_id: &str, task_id: &str) -> Result<Option<Task>> {
        Ok(self
            .lock()
            .iter()
            .find(|t| t.id == task_id && t.user_id == user_id)
            .cloned())
    }

    fn find_overlapping(
        &self,
        user_id: &str,
        interval: &Interval,
        exclude_task_id: Option<&str>,
    ) -> Result<Vec<Task>> {
        Ok(overlapping_in(&self.lock(), user_id, interval, exclude_task_id))
    }

    fn find_scheduled_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let mut tasks = self.select(|t| {
            t.user_id == user_id && t.scheduled_start.is_some_and(|s| s >= from && s < until)
        });
        tasks.sort_by_key(|t| t.scheduled_start);
        Ok(tasks)
    }

    fn find_unscheduled(&self, user_id: &str) -> Result<Vec<Task>> {
        let mut tasks = self.select(|t| t.user_id == user_id && t.is_auto_schedulable());
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    fn find_missed(&self, user_id: &str, from: DateTime<Utc>) -> Result<Vec<Task>> {
        let mut tasks = self.select(|t| {
            t.user_id == user_id
                && t.status.is_open()
                && t.scheduled_start.is_some_and(|s| s < from)
                && t.deadline.is_some_and(|d| d >= from)
        });
        tasks.sort_by_key(|t| t.deadline);
        Ok(tasks)
    }

    fn find_for_week(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let in_range = |ts: Option<DateTime<Utc>>| ts.is_some_and(|s| s >= from && s < until);
        let mut tasks = self.select(|t| {
            t.user_id == user_id && (in_range(t.scheduled_start) || in_range(t.deadline))
        });
        tasks.sort_by_key(|t| (t.scheduled_start, t.deadline));
        Ok(tasks)
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<Task>> {
        let mut tasks = self.select(|t| t.user_id == user_id);
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    fn save(&self, task: &Task) -> Result<Task> {
        let mut tasks = self.lock();
        guard_overlap(&tasks, task)?;
        let slot = tasks
            .iter_mut()
            .find(|t| t.id == task.id && t.user_id == task.user_id)
            .ok_or_else(|| PlannerError::NotFound {
                id: task.id.clone(),
            })?;
        if slot.version != task.version {
            return Err(PlannerError::Stale {
                id: task.id.clone(),
            });
        }
        let mut saved = task.clone();
        saved.version += 1;
        saved.updated_at = Utc::now();
        *slot = saved.clone();
        Ok(saved)
    }
}
