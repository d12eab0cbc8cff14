//! Auto-Scheduler: greedy placement of unscheduled tasks in priority order.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{PlannerError, Result};
use crate::planner::Planner;
use crate::priority::sort_by_priority;
use crate::slot::{duration_from_hours, find_slot};
use crate::store::TaskStore;
use crate::types::{AutoScheduleOutcome, FailedTask, FailureReason, ScheduleWindow, Task};

/// Placement attempts per task when a concurrent writer keeps winning the slot.
const MAX_PLACEMENT_ATTEMPTS: usize = 3;

/// Result of trying to place one task.
type Placement = std::result::Result<Task, FailureReason>;

impl<S: TaskStore> Planner<S> {
    /// Window starting at `start` and spanning the configured horizon.
    pub fn default_window(&self, start: DateTime<Utc>) -> Result<ScheduleWindow> {
        ScheduleWindow::days_ahead(start, self.options().horizon_days)
    }

    /// Place every eligible candidate into the first free slot of `window`.
    ///
    /// Candidates are re-read from the store; anything not owned by
    /// `user_id`, closed, or already scheduled is ignored, so running the
    /// same batch twice changes nothing the second time. Tasks are visited
    /// in priority order and each one sees the slots taken by those before
    /// it. Per-task failures land in `failed`; store errors abort the batch.
    #[instrument(skip(self, candidates, cancel), fields(candidates = candidates.len()))]
    pub fn auto_schedule(
        &self,
        user_id: &str,
        candidates: Vec<Task>,
        window: ScheduleWindow,
        cancel: &CancellationToken,
    ) -> Result<AutoScheduleOutcome> {
        self.locks().with_user(user_id, || {
            let mut eligible = Vec::with_capacity(candidates.len());
            for candidate in candidates.iter().filter(|t| t.user_id == user_id) {
                if let Some(fresh) = self.store().find_by_id(user_id, &candidate.id)? {
                    if fresh.is_auto_schedulable() && !eligible.iter().any(|t: &Task| t.id == fresh.id) {
                        eligible.push(fresh);
                    }
                }
            }

            let ordered = sort_by_priority(eligible, self.options().tie_break);
            let mut outcome = AutoScheduleOutcome {
                total: ordered.len(),
                ..AutoScheduleOutcome::default()
            };

            for task in ordered {
                if cancel.is_cancelled() {
                    outcome.cancelled = true;
                    warn!(
                        done = outcome.scheduled.len() + outcome.failed.len(),
                        total = outcome.total,
                        "auto-schedule cancelled"
                    );
                    break;
                }
                match self.place(user_id, &task, window)? {
                    Ok(saved) => outcome.scheduled.push(saved),
                    Err(reason) => {
                        debug!(task_id = %task.id, %reason, "task not placed");
                        outcome.failed.push(FailedTask { task, reason });
                    }
                }
            }

            info!(
                scheduled = outcome.scheduled.len(),
                failed = outcome.failed.len(),
                total = outcome.total,
                "auto-schedule finished"
            );
            Ok(outcome)
        })
    }

    /// [`auto_schedule`](Self::auto_schedule) over every open, unscheduled
    /// task the user owns.
    pub fn auto_schedule_pending(
        &self,
        user_id: &str,
        window: ScheduleWindow,
        cancel: &CancellationToken,
    ) -> Result<AutoScheduleOutcome> {
        let candidates = self.store().find_unscheduled(user_id)?;
        self.auto_schedule(user_id, candidates, window, cancel)
    }

    /// Place a single task, surfacing a failure as an error.
    #[instrument(skip(self, window))]
    pub fn auto_schedule_one(
        &self,
        user_id: &str,
        task_id: &str,
        window: ScheduleWindow,
    ) -> Result<Task> {
        self.locks().with_user(user_id, || {
            let task = self.get_task(user_id, task_id)?;
            if !task.is_auto_schedulable() {
                return Err(PlannerError::Validation(format!(
                    "task {task_id} is already scheduled or no longer open"
                )));
            }
            match self.place(user_id, &task, window)? {
                Ok(saved) => Ok(saved),
                Err(reason) => Err(FailedTask { task, reason }.into_error()),
            }
        })
    }

    /// Search and save one task. Caller holds the user's lock.
    fn place(&self, user_id: &str, task: &Task, window: ScheduleWindow) -> Result<Placement> {
        if task.deadline.is_some_and(|d| d < window.start) {
            return Ok(Err(FailureReason::DeadlinePassed));
        }
        if duration_from_hours(task.estimated_hours).is_err() {
            return Ok(Err(FailureReason::InvalidDuration));
        }
        let bound = task
            .deadline
            .map_or(window.end, |deadline| deadline.min(window.end));

        for attempt in 1..=MAX_PLACEMENT_ATTEMPTS {
            let Some(slot) = find_slot(
                self.store(),
                user_id,
                window.start,
                bound,
                task.estimated_hours,
                &self.options().work_hours,
                Some(&task.id),
            )?
            else {
                return Ok(Err(FailureReason::SlotUnavailable));
            };

            let mut updated = task.clone();
            updated.set_schedule(slot);
            match self.store().save(&updated) {
                Ok(saved) => {
                    debug!(task_id = %saved.id, start = %slot.start(), "task placed");
                    return Ok(Ok(saved));
                }
                Err(PlannerError::Conflict { .. }) => {
                    debug!(task_id = %task.id, attempt, "slot taken by another writer, retrying");
                }
                Err(PlannerError::Stale { .. } | PlannerError::NotFound { .. }) => {
                    return Ok(Err(FailureReason::Stale));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Err(FailureReason::SlotUnavailable))
    }
}
