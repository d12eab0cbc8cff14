use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PlannerError, Result};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// Pending or in progress: the task still needs time on the calendar.
    pub fn is_open(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in-progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Numeric tier; higher is scheduled first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Urgent => 4,
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Exam,
    #[default]
    Assignment,
    Revision,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskKind::Exam => "exam",
            TaskKind::Assignment => "assignment",
            TaskKind::Revision => "revision",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "exam" => Ok(TaskKind::Exam),
            "assignment" => Ok(TaskKind::Assignment),
            "revision" => Ok(TaskKind::Revision),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

/// Half-open time range `[start, end)` occupied on a user's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawInterval> for Interval {
    type Error = PlannerError;

    fn try_from(raw: RawInterval) -> Result<Self> {
        Interval::new(raw.start, raw.end)
    }
}

impl Interval {
    /// Fails with `Validation` unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(PlannerError::Validation(format!(
                "interval start {} must be before end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Length in fractional hours.
    pub fn hours(&self) -> f64 {
        self.duration().num_milliseconds() as f64 / 3_600_000.0
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        crate::conflict::overlaps(self, other)
    }
}

/// A unit of study work owned by one user.
///
/// Only the scheduling-relevant fields are modelled here; course links,
/// subtasks and notes belong to the task-management side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// UUIDv7 string, primary key.
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_hours: f64,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Both set or both absent; `scheduled_start < scheduled_end` when set.
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
    /// Accumulated by study sessions; never touched by the planner.
    pub actual_hours: f64,
    /// Bumped on every successful save; writes against an older version fail.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.into(),
            title: title.into(),
            kind: TaskKind::default(),
            deadline: None,
            estimated_hours: 1.0,
            status: TaskStatus::default(),
            priority: Priority::default(),
            scheduled_start: None,
            scheduled_end: None,
            actual_hours: 0.0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_estimated_hours(mut self, hours: f64) -> Self {
        self.estimated_hours = hours;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    pub fn with_schedule(mut self, interval: Interval) -> Self {
        self.set_schedule(interval);
        self
    }

    /// The stored slot, if the task is scheduled and the slot is well formed.
    pub fn interval(&self) -> Option<Interval> {
        match (self.scheduled_start, self.scheduled_end) {
            (Some(start), Some(end)) => Interval::new(start, end).ok(),
            _ => None,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled_start.is_some()
    }

    /// Open and not yet on the calendar.
    pub fn is_auto_schedulable(&self) -> bool {
        self.status.is_open() && !self.is_scheduled()
    }

    pub fn set_schedule(&mut self, interval: Interval) {
        self.scheduled_start = Some(interval.start());
        self.scheduled_end = Some(interval.end());
    }

    pub fn clear_schedule(&mut self) {
        self.scheduled_start = None;
        self.scheduled_end = None;
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            start: self.scheduled_start,
            end: self.scheduled_end,
        }
    }
}

/// Compact view of a scheduled task used in conflict reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Two scheduled tasks of the same user whose slots overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictPair {
    #[serde(rename = "task1")]
    pub first: TaskSummary,
    #[serde(rename = "task2")]
    pub second: TaskSummary,
}

/// Search window `[start, end)` for batch scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ScheduleWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window covering `days` whole days from `start`.
    pub fn days_ahead(start: DateTime<Utc>, days: i64) -> Result<Self> {
        Ok(Self {
            start,
            end: days_after(start, days)?,
        })
    }
}

/// Longest range, in days, a window or audit may span.
pub const MAX_SPAN_DAYS: i64 = 3_660;

/// `start` moved forward by `days` whole days.
///
/// `days` must lie in `1..=MAX_SPAN_DAYS` and the result must be a
/// representable instant.
pub fn days_after(start: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    if !(1..=MAX_SPAN_DAYS).contains(&days) {
        return Err(PlannerError::Validation(format!(
            "day count must be between 1 and {MAX_SPAN_DAYS}, got {days}"
        )));
    }
    Duration::try_days(days)
        .and_then(|span| start.checked_add_signed(span))
        .ok_or_else(|| PlannerError::Validation(format!("{days} days after {start} is out of range")))
}

/// Why a task could not be placed by a batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// Every candidate slot in the window was taken.
    SlotUnavailable,
    /// The deadline lies before the start of the search window.
    DeadlinePassed,
    /// `estimated_hours` is zero, negative or not a number.
    InvalidDuration,
    /// Another writer changed the task while the batch was running.
    Stale,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureReason::SlotUnavailable => "slot-unavailable",
            FailureReason::DeadlinePassed => "deadline-passed",
            FailureReason::InvalidDuration => "invalid-duration",
            FailureReason::Stale => "stale",
        };
        write!(f, "{s}")
    }
}

/// A task left unmodified by a batch operation, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTask {
    pub task: Task,
    pub reason: FailureReason,
}

impl FailedTask {
    /// The single-task error equivalent of this failure.
    pub fn into_error(self) -> PlannerError {
        match self.reason {
            FailureReason::SlotUnavailable => PlannerError::SlotUnavailable {
                task_id: self.task.id,
            },
            FailureReason::DeadlinePassed => PlannerError::Validation(format!(
                "deadline of task {} has already passed",
                self.task.id
            )),
            FailureReason::InvalidDuration => PlannerError::Validation(format!(
                "task {} has invalid estimated hours {}",
                self.task.id, self.task.estimated_hours
            )),
            FailureReason::Stale => PlannerError::Stale { id: self.task.id },
        }
    }
}

/// Result of an auto-schedule run: a partition of the eligible tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoScheduleOutcome {
    pub scheduled: Vec<Task>,
    pub failed: Vec<FailedTask>,
    /// Number of eligible tasks the run started with.
    pub total: usize,
    /// True when the run stopped early; unvisited tasks are in neither list.
    pub cancelled: bool,
}

/// Weekly capacity report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverloadReport {
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub total_hours: f64,
    pub task_count: usize,
    pub threshold: f64,
    pub is_overloaded: bool,
    pub warning: Option<String>,
}

/// Tasks of one local calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayView {
    pub date: NaiveDate,
    pub day_start: DateTime<Utc>,
    pub day_end: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

/// Tasks of one week grouped by calendar day (all seven days present).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekView {
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub tasks_by_day: BTreeMap<NaiveDate, Vec<Task>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn interval_rejects_empty_and_inverted() {
        assert!(Interval::new(at(10, 0), at(10, 0)).is_err());
        assert!(matches!(
            Interval::new(at(11, 0), at(10, 0)),
            Err(PlannerError::Validation(_))
        ));
        let iv = Interval::new(at(10, 0), at(11, 30)).unwrap();
        assert_eq!(iv.hours(), 1.5);
    }

    #[test]
    fn interval_deserialize_validates() {
        let ok: Interval =
            serde_json::from_str(r#"{"start":"2026-03-02T10:00:00Z","end":"2026-03-02T11:00:00Z"}"#)
                .unwrap();
        assert_eq!(ok.start(), at(10, 0));
        let bad = serde_json::from_str::<Interval>(
            r#"{"start":"2026-03-02T11:00:00Z","end":"2026-03-02T10:00:00Z"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            r#""in-progress""#
        );
        assert_eq!("in-progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn task_defaults() {
        let task = Task::new("u1", "Read chapter 4");
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.kind, TaskKind::Assignment);
        assert_eq!(task.estimated_hours, 1.0);
        assert!(task.is_auto_schedulable());
    }

    #[test]
    fn task_serializes_with_type_field() {
        let task = Task::new("u1", "Mock exam").with_kind(TaskKind::Exam);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "exam");
        assert_eq!(json["userId"], "u1");
        assert!(json["scheduledStart"].is_null());
    }

    #[test]
    fn schedule_roundtrip_on_task() {
        let mut task = Task::new("u1", "Essay");
        let iv = Interval::new(at(9, 0), at(10, 0)).unwrap();
        task.set_schedule(iv);
        assert_eq!(task.interval(), Some(iv));
        assert!(!task.is_auto_schedulable());
        task.clear_schedule();
        assert!(task.interval().is_none());
        assert!(task.scheduled_end.is_none());
    }

    #[test]
    fn completed_tasks_are_not_auto_schedulable() {
        let task = Task::new("u1", "Done").with_status(TaskStatus::Completed);
        assert!(!task.is_auto_schedulable());
    }

    #[test]
    fn failed_task_maps_to_error() {
        let failed = FailedTask {
            task: Task::new("u1", "x").with_id("t1"),
            reason: FailureReason::SlotUnavailable,
        };
        match failed.into_error() {
            PlannerError::SlotUnavailable { task_id } => assert_eq!(task_id, "t1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn window_length_is_checked() {
        let w = ScheduleWindow::days_ahead(at(9, 0), 7).unwrap();
        assert_eq!(w.end - w.start, Duration::days(7));
        for days in [0, -3, MAX_SPAN_DAYS + 1, i64::MAX / 86_400, i64::MAX] {
            assert!(
                matches!(ScheduleWindow::days_ahead(at(9, 0), days), Err(PlannerError::Validation(_))),
                "{days} days accepted"
            );
        }
        assert!(matches!(
            days_after(DateTime::<Utc>::MAX_UTC, 1),
            Err(PlannerError::Validation(_))
        ));
    }
}
