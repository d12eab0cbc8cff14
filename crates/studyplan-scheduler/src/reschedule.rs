//! Rescheduler and the pairwise conflict audit.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::conflict::conflicting_pairs;
use crate::error::{PlannerError, Result};
use crate::planner::Planner;
use crate::priority::sort_by_priority;
use crate::slot::find_slot;
use crate::store::TaskStore;
use crate::types::{days_after, ConflictPair, Task, TaskStatus};

impl<S: TaskStore> Planner<S> {
    /// Move open tasks whose slot already started before `from` but which
    /// are still due at or after `from` into the first free slot in
    /// `[from, deadline)`.
    ///
    /// Tasks are handled in priority order. A task that finds no slot, or
    /// that another writer touched meanwhile, keeps its old schedule and is
    /// left out of the result. Returns the moved tasks.
    #[instrument(skip(self, cancel))]
    pub fn reschedule_missed(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Task>> {
        self.locks().with_user(user_id, || {
            let missed = self.store().find_missed(user_id, from)?;
            let total = missed.len();
            let mut moved = Vec::new();

            for task in sort_by_priority(missed, self.options().tie_break) {
                if cancel.is_cancelled() {
                    warn!(moved = moved.len(), total, "reschedule cancelled");
                    break;
                }
                let Some(deadline) = task.deadline else {
                    continue;
                };
                let Some(slot) = find_slot(
                    self.store(),
                    user_id,
                    from,
                    deadline,
                    task.estimated_hours,
                    &self.options().work_hours,
                    Some(&task.id),
                )
                .or_else(|e| match e {
                    PlannerError::Validation(_) => Ok(None),
                    other => Err(other),
                })?
                else {
                    debug!(task_id = %task.id, "no slot before deadline, keeping schedule");
                    continue;
                };

                let mut updated = task.clone();
                updated.set_schedule(slot);
                match self.store().save(&updated) {
                    Ok(saved) => {
                        debug!(task_id = %saved.id, start = %slot.start(), "task rescheduled");
                        moved.push(saved);
                    }
                    Err(
                        PlannerError::Conflict { .. }
                        | PlannerError::Stale { .. }
                        | PlannerError::NotFound { .. },
                    ) => {
                        debug!(task_id = %task.id, "concurrent change, keeping schedule");
                    }
                    Err(e) => return Err(e),
                }
            }

            info!(moved = moved.len(), total, "reschedule finished");
            Ok(moved)
        })
    }

    /// Every overlapping pair among the user's live tasks starting in
    /// `[from, from + days_ahead days)`. `days_ahead` must be at least one.
    pub fn detect_conflicts(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        days_ahead: i64,
    ) -> Result<Vec<ConflictPair>> {
        let until = days_after(from, days_ahead)?;
        let tasks: Vec<Task> = self
            .store()
            .find_scheduled_between(user_id, from, until)?
            .into_iter()
            .filter(|t| t.status != TaskStatus::Cancelled)
            .collect();
        let pairs = conflicting_pairs(&tasks);
        if !pairs.is_empty() {
            warn!(user_id, count = pairs.len(), "overlapping tasks on calendar");
        }
        Ok(pairs)
    }
}
