//! Batch-scheduling order over tasks.

use std::cmp::Ordering;

use studyplan_core::config::TieBreak;

use crate::types::Task;

/// Compare two tasks in scheduling order.
///
/// 1. priority tier, highest first
/// 2. dated before undated, earlier deadline first
/// 3. creation time as chosen by `tie_break`
pub fn compare(a: &Task, b: &Task, tie_break: TieBreak) -> Ordering {
    b.priority
        .rank()
        .cmp(&a.priority.rank())
        .then_with(|| match (a.deadline, b.deadline) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| match tie_break {
            TieBreak::NewestFirst => b.created_at.cmp(&a.created_at),
            TieBreak::OldestFirst => a.created_at.cmp(&b.created_at),
        })
}

/// Stable sort into scheduling order. Pure; no I/O.
pub fn sort_by_priority(mut tasks: Vec<Task>, tie_break: TieBreak) -> Vec<Task> {
    tasks.sort_by(|a, b| compare(a, b, tie_break));
    tasks
}
