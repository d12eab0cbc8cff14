//! Interval overlap predicate and pairwise conflict audit.

use crate::types::{ConflictPair, Interval, Task};

/// Half-open overlap test: `a.start < b.end && a.end > b.start`.
///
/// Covers partial overlap, containment and identical intervals. Touching
/// intervals (`a.end == b.start`) do not overlap.
pub fn overlaps(a: &Interval, b: &Interval) -> bool {
    a.start() < b.end() && a.end() > b.start()
}

/// Every overlapping pair among `tasks`, in input order.
///
/// Unscheduled tasks are ignored. Quadratic; meant for audits over a few
/// days of one user's calendar, not for blocking writes.
pub fn conflicting_pairs(tasks: &[Task]) -> Vec<ConflictPair> {
    let scheduled: Vec<(&Task, Interval)> = tasks
        .iter()
        .filter_map(|t| t.interval().map(|iv| (t, iv)))
        .collect();

    let mut pairs = Vec::new();
    for (i, (first, a)) in scheduled.iter().enumerate() {
        for (second, b) in &scheduled[i + 1..] {
            if overlaps(a, b) {
                pairs.push(ConflictPair {
                    first: first.summary(),
                    second: second.summary(),
                });
            }
        }
    }
    pairs
}
