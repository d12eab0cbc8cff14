//! Overload Detector and the daily and weekly calendar views.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{info, instrument};

use crate::error::Result;
use crate::planner::Planner;
use crate::store::TaskStore;
use crate::types::{days_after, DayView, OverloadReport, Task, TaskStatus, WeekView};

const DAYS_PER_WEEK: i64 = 7;

/// Scheduled milliseconds of a task, falling back to its estimate.
fn scheduled_millis(task: &Task) -> i64 {
    match task.interval() {
        Some(iv) => iv.duration().num_milliseconds(),
        None => (task.estimated_hours.max(0.0) * 3_600_000.0).round() as i64,
    }
}

/// Build the capacity report for `tasks` (already limited to the week).
///
/// Cancelled tasks do not count. Overloaded only when the total strictly
/// exceeds `threshold`.
pub fn summarize_week(
    tasks: &[Task],
    week_start: DateTime<Utc>,
    threshold: f64,
) -> Result<OverloadReport> {
    let live: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status != TaskStatus::Cancelled)
        .collect();
    let total_millis: i64 = live.iter().map(|t| scheduled_millis(t)).sum();
    let total_hours = total_millis as f64 / 3_600_000.0;
    let is_overloaded = total_hours > threshold;
    let warning = is_overloaded.then(|| {
        format!(
            "You have {total_hours:.1} hours scheduled this week, exceeding the recommended {threshold} hours."
        )
    });
    Ok(OverloadReport {
        week_start,
        week_end: days_after(week_start, DAYS_PER_WEEK)?,
        total_hours,
        task_count: live.len(),
        threshold,
        is_overloaded,
        warning,
    })
}

impl<S: TaskStore> Planner<S> {
    /// Sum the hours scheduled in `[week_start, week_start + 7 days)` and
    /// compare against `threshold` (configured default when `None`).
    #[instrument(skip(self))]
    pub fn detect_overload(
        &self,
        user_id: &str,
        week_start: DateTime<Utc>,
        threshold: Option<f64>,
    ) -> Result<OverloadReport> {
        let threshold = threshold.unwrap_or(self.options().overload_threshold);
        let week_end = days_after(week_start, DAYS_PER_WEEK)?;
        let tasks = self
            .store()
            .find_scheduled_between(user_id, week_start, week_end)?;
        let report = summarize_week(&tasks, week_start, threshold)?;
        if report.is_overloaded {
            info!(total_hours = report.total_hours, threshold, "week overloaded");
        }
        Ok(report)
    }

    /// Tasks scheduled on, or due on, the local calendar day `date` in the
    /// work-hours timezone.
    ///
    /// Ordered by slot start (unscheduled tasks first, as they carry only a
    /// deadline), then by priority, highest first.
    pub fn day_view(&self, user_id: &str, date: NaiveDate) -> Result<DayView> {
        let (day_start, day_end) = self.options().work_hours.day_bounds(date)?;
        let mut tasks = self.store().find_for_week(user_id, day_start, day_end)?;
        tasks.sort_by_key(|t| (t.scheduled_start, Reverse(t.priority.rank())));
        Ok(DayView {
            date,
            day_start,
            day_end,
            tasks,
        })
    }

    /// Tasks of the week grouped by day. Scheduled tasks go under the day
    /// their slot starts; unscheduled ones under the day they are due.
    ///
    /// Day `n` covers `[week_start + n days, week_start + n+1 days)` and is
    /// keyed by the calendar date of its first instant in the work-hours
    /// timezone. All seven keys are always present.
    pub fn week_view(&self, user_id: &str, week_start: DateTime<Utc>) -> Result<WeekView> {
        let week_end = days_after(week_start, DAYS_PER_WEEK)?;
        let work = &self.options().work_hours;
        let keys: Vec<_> = (0..DAYS_PER_WEEK)
            .map(|n| work.local_date(week_start + Duration::days(n)))
            .collect();
        let mut tasks_by_day: BTreeMap<_, Vec<Task>> =
            keys.iter().map(|day| (*day, Vec::new())).collect();

        for task in self.store().find_for_week(user_id, week_start, week_end)? {
            let anchor = match (task.scheduled_start, task.deadline) {
                (Some(start), _) => start,
                (None, Some(deadline)) => deadline,
                (None, None) => continue,
            };
            if anchor < week_start || anchor >= week_end {
                continue;
            }
            let index = (anchor - week_start).num_days() as usize;
            if let Some(bucket) = keys.get(index).and_then(|day| tasks_by_day.get_mut(day)) {
                bucket.push(task);
            }
        }

        Ok(WeekView {
            week_start,
            week_end,
            tasks_by_day,
        })
    }
}
