use chrono::{DateTime, Utc};
use studyplan_core::config::{
    PlannerConfig, TieBreak, DEFAULT_HORIZON_DAYS, DEFAULT_OVERLOAD_THRESHOLD_HOURS,
};
use tracing::{info, instrument, warn};

use crate::error::{PlannerError, Result};
use crate::locks::UserLocks;
use crate::slot::{self, WorkHours};
use crate::store::TaskStore;
use crate::types::{Interval, Task, MAX_SPAN_DAYS};

/// Tunables shared by every planner operation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerOptions {
    pub work_hours: WorkHours,
    /// Weekly hours above which `detect_overload` raises a warning.
    pub overload_threshold: f64,
    /// Days spanned by an auto-schedule window when no end is given.
    pub horizon_days: i64,
    pub tie_break: TieBreak,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            work_hours: WorkHours::default(),
            overload_threshold: DEFAULT_OVERLOAD_THRESHOLD_HOURS,
            horizon_days: DEFAULT_HORIZON_DAYS,
            tie_break: TieBreak::default(),
        }
    }
}

impl PlannerOptions {
    pub fn from_config(cfg: &PlannerConfig) -> Result<Self> {
        if !cfg.overload_threshold_hours.is_finite() || cfg.overload_threshold_hours < 0.0 {
            return Err(PlannerError::Validation(format!(
                "overload threshold must be a non-negative number, got {}",
                cfg.overload_threshold_hours
            )));
        }
        if !(1..=MAX_SPAN_DAYS).contains(&cfg.horizon_days) {
            return Err(PlannerError::Validation(format!(
                "horizon must be between 1 and {MAX_SPAN_DAYS} days, got {}",
                cfg.horizon_days
            )));
        }
        Ok(Self {
            work_hours: WorkHours::from_config(cfg)?,
            overload_threshold: cfg.overload_threshold_hours,
            horizon_days: cfg.horizon_days,
            tie_break: cfg.tie_break,
        })
    }
}

/// Scheduling engine over an injected [`TaskStore`].
///
/// Holds no calendar state of its own; every decision is made against the
/// store. Mutating operations run under the user's lock so a check and the
/// write that depends on it are never interleaved with another writer in
/// this process.
pub struct Planner<S: TaskStore> {
    store: S,
    options: PlannerOptions,
    locks: UserLocks,
}

impl<S: TaskStore> Planner<S> {
    pub fn new(store: S, options: PlannerOptions) -> Self {
        Self {
            store,
            options,
            locks: UserLocks::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    pub(crate) fn locks(&self) -> &UserLocks {
        &self.locks
    }

    /// Create a new task. Fails with `Conflict` if it carries a taken slot.
    #[instrument(skip(self, task), fields(user_id = %task.user_id, task_id = %task.id))]
    pub fn add_task(&self, task: Task) -> Result<Task> {
        if task.title.trim().is_empty() {
            return Err(PlannerError::Validation("title must not be empty".to_string()));
        }
        if !task.estimated_hours.is_finite() || task.estimated_hours < 0.0 {
            return Err(PlannerError::Validation(format!(
                "estimated hours must be a non-negative number, got {}",
                task.estimated_hours
            )));
        }
        let stored = self
            .locks
            .with_user(&task.user_id, || self.store.insert(&task))?;
        info!(title = %stored.title, "task added");
        Ok(stored)
    }

    pub fn get_task(&self, user_id: &str, task_id: &str) -> Result<Task> {
        self.store
            .find_by_id(user_id, task_id)?
            .ok_or_else(|| PlannerError::NotFound {
                id: task_id.to_string(),
            })
    }

    pub fn list_tasks(&self, user_id: &str) -> Result<Vec<Task>> {
        self.store.list_for_user(user_id)
    }

    /// Live tasks of `user_id` whose slot overlaps `interval`, by start time.
    pub fn check_conflicts(
        &self,
        user_id: &str,
        interval: &Interval,
        exclude_task_id: Option<&str>,
    ) -> Result<Vec<Task>> {
        self.store
            .find_overlapping(user_id, interval, exclude_task_id)
    }

    /// First free slot in `[window_start, window_end)`; configured work hours
    /// unless `work_hours` overrides them.
    pub fn find_slot(
        &self,
        user_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        duration_hours: f64,
        work_hours: Option<&WorkHours>,
    ) -> Result<Option<Interval>> {
        slot::find_slot(
            &self.store,
            user_id,
            window_start,
            window_end,
            duration_hours,
            work_hours.unwrap_or(&self.options.work_hours),
            None,
        )
    }

    /// Place a task on a caller-chosen slot.
    ///
    /// Rejected with `Conflict` (listing the clashing tasks) if any other
    /// live task of the user overlaps. The deadline is not enforced here.
    #[instrument(skip(self, interval), fields(start = %interval.start(), end = %interval.end()))]
    pub fn schedule_task(&self, user_id: &str, task_id: &str, interval: Interval) -> Result<Task> {
        self.locks.with_user(user_id, || {
            let mut task = self.get_task(user_id, task_id)?;
            let conflicts = self.check_conflicts(user_id, &interval, Some(task_id))?;
            if !conflicts.is_empty() {
                warn!(count = conflicts.len(), "schedule rejected: conflict");
                return Err(PlannerError::Conflict { conflicts });
            }
            task.set_schedule(interval);
            let saved = self.store.save(&task)?;
            info!("task scheduled");
            Ok(saved)
        })
    }

    /// Clear a task's slot. A task with no slot is returned unchanged.
    #[instrument(skip(self))]
    pub fn unschedule_task(&self, user_id: &str, task_id: &str) -> Result<Task> {
        self.locks.with_user(user_id, || {
            let mut task = self.get_task(user_id, task_id)?;
            if !task.is_scheduled() {
                return Ok(task);
            }
            task.clear_schedule();
            let saved = self.store.save(&task)?;
            info!("task unscheduled");
            Ok(saved)
        })
    }
}

/// True unless both are present and `start` is after `deadline`.
pub fn validate_deadline(start: DateTime<Utc>, deadline: Option<DateTime<Utc>>) -> bool {
    deadline.map_or(true, |d| start <= d)
}
