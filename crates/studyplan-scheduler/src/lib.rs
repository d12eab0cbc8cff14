//! `studyplan-scheduler`: task scheduling and conflict resolution for the
//! study planner.
//!
//! # Overview
//!
//! Tasks live in a [`store::TaskStore`] (SQLite in production, an in-memory
//! map in tests). The [`planner::Planner`] wraps a store and exposes every
//! scheduling operation:
//!
//! | Operation             | Behaviour                                                  |
//! |-----------------------|------------------------------------------------------------|
//! | `check_conflicts`     | Scheduled tasks overlapping a candidate interval           |
//! | `find_slot`           | First free whole-hour slot inside the daily work window    |
//! | `schedule_task`       | Manual placement, rejected on conflict                     |
//! | `unschedule_task`     | Clear a task's slot                                        |
//! | `auto_schedule`       | Greedy batch placement in priority order                   |
//! | `auto_schedule_pending` | `auto_schedule` over every open unscheduled task         |
//! | `reschedule_missed`   | Move passed, unfinished, still-due tasks to a new slot     |
//! | `detect_conflicts`    | Pairwise overlap audit over a date range                   |
//! | `detect_overload`     | Weekly hours against a capacity threshold                  |
//! | `day_view`            | One local day's tasks by start time, then priority         |
//! | `week_view`           | A week's tasks grouped by day                              |
//!
//! All intervals are half-open `[start, end)`. Mutating operations are
//! serialised per user and every write is version-checked by the store.

pub mod auto;
pub mod conflict;
pub mod db;
pub mod error;
pub mod locks;
pub mod memory;
pub mod overload;
pub mod planner;
pub mod priority;
pub mod reschedule;
pub mod slot;
pub mod store;
#[cfg(test)]
mod testing;
pub mod types;

pub use error::{PlannerError, Result};
pub use memory::MemoryTaskStore;
pub use planner::{validate_deadline, Planner, PlannerOptions};
pub use slot::WorkHours;
pub use store::{SqliteTaskStore, TaskStore};
pub use studyplan_core::config::TieBreak;
pub use types::{
    days_after, AutoScheduleOutcome, ConflictPair, DayView, FailedTask, FailureReason, Interval,
    OverloadReport, Priority, ScheduleWindow, Task, TaskKind, TaskStatus, TaskSummary, WeekView,
    MAX_SPAN_DAYS,
};
