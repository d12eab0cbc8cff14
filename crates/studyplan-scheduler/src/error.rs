use thiserror::Error;

use crate::types::Task;

/// Errors that can occur within the scheduling engine.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// The candidate interval overlaps tasks that are already scheduled.
    #[error("Scheduling conflict with {} task(s)", .conflicts.len())]
    Conflict { conflicts: Vec<Task> },

    /// No task with the given ID exists for the requesting user.
    #[error("Task not found: {id}")]
    NotFound { id: String },

    /// Caller input is malformed (empty interval, bad duration, bad work hours).
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The slot search exhausted its window without finding a free slot.
    #[error("No free slot for task {task_id}")]
    SlotUnavailable { task_id: String },

    /// The stored task moved on since the snapshot was read.
    #[error("Task {id} was modified concurrently")]
    Stale { id: String },

    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),

    /// A stored row could not be decoded into a task.
    #[error("Corrupt task record: {0}")]
    Corrupt(String),
}

impl PlannerError {
    /// Short error code string for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            PlannerError::Conflict { .. } => "SCHEDULE_CONFLICT",
            PlannerError::NotFound { .. } => "TASK_NOT_FOUND",
            PlannerError::Validation(_) => "VALIDATION_ERROR",
            PlannerError::SlotUnavailable { .. } => "SLOT_UNAVAILABLE",
            PlannerError::Stale { .. } => "STALE_TASK",
            PlannerError::Store(_) => "DATABASE_ERROR",
            PlannerError::Corrupt(_) => "CORRUPT_RECORD",
        }
    }

    /// HTTP status an API layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            PlannerError::Conflict { .. } | PlannerError::Validation(_) => 400,
            PlannerError::NotFound { .. } => 404,
            PlannerError::SlotUnavailable { .. } | PlannerError::Stale { .. } => 409,
            PlannerError::Store(_) | PlannerError::Corrupt(_) => 500,
        }
    }

    /// True for infrastructure failures that abort a whole batch.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, PlannerError::Store(_) | PlannerError::Corrupt(_))
    }
}

pub type Result<T> = std::result::Result<T, PlannerError>;
