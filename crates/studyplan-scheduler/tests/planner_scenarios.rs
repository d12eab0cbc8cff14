// End-to-end planner behaviour over the SQLite store.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use studyplan_scheduler::{
    FailureReason, Interval, Planner, PlannerError, PlannerOptions, Priority, ScheduleWindow,
    SqliteTaskStore, Task, TaskStatus, TaskStore, WorkHours,
};
use tokio_util::sync::CancellationToken;

fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, d, h, m, 0).unwrap()
}

fn slot(d: u32, sh: u32, sm: u32, eh: u32, em: u32) -> Interval {
    Interval::new(at(d, sh, sm), at(d, eh, em)).unwrap()
}

fn planner() -> Planner<SqliteTaskStore> {
    Planner::new(
        SqliteTaskStore::open_in_memory().unwrap(),
        PlannerOptions::default(),
    )
}

#[test]
fn overlapping_proposal_reports_existing_task() {
    let p = planner();
    let a = p
        .add_task(Task::new("u1", "A").with_schedule(slot(2, 10, 0, 11, 0)))
        .unwrap();

    let conflicts = p
        .check_conflicts("u1", &slot(2, 10, 30, 11, 30), None)
        .unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].id, a.id);

    // touching is fine, other users are invisible
    assert!(p
        .check_conflicts("u1", &slot(2, 11, 0, 12, 0), None)
        .unwrap()
        .is_empty());
    assert!(p
        .check_conflicts("u2", &slot(2, 10, 30, 11, 30), None)
        .unwrap()
        .is_empty());

    let b = p.add_task(Task::new("u1", "B")).unwrap();
    let err = p
        .schedule_task("u1", &b.id, slot(2, 10, 30, 11, 30))
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert!(matches!(err, PlannerError::Conflict { ref conflicts } if conflicts[0].id == a.id));
}

#[test]
fn auto_schedule_packs_equal_tasks_from_nine() {
    let p = planner();
    let tasks: Vec<Task> = (0..3)
        .map(|i| {
            p.add_task(
                Task::new("u1", format!("task {i}"))
                    .with_estimated_hours(2.0)
                    .with_created_at(at(1, 8 + i, 0)),
            )
            .unwrap()
        })
        .collect();

    let outcome = p
        .auto_schedule(
            "u1",
            tasks,
            ScheduleWindow::days_ahead(at(2, 0, 0), 7).unwrap(),
            &CancellationToken::new(),
        )
        .unwrap();

    let placed: Vec<(String, u32, u32)> = outcome
        .scheduled
        .iter()
        .map(|t| {
            (
                t.title.clone(),
                t.scheduled_start.unwrap().hour(),
                t.scheduled_end.unwrap().hour(),
            )
        })
        .collect();
    assert_eq!(
        placed,
        vec![
            ("task 2".to_string(), 9, 11),
            ("task 1".to_string(), 11, 13),
            ("task 0".to_string(), 13, 15),
        ]
    );
    assert!(p.detect_conflicts("u1", at(2, 0, 0), 7).unwrap().is_empty());

    // idempotent
    let again = p
        .auto_schedule_pending(
            "u1",
            ScheduleWindow::days_ahead(at(2, 0, 0), 7).unwrap(),
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(again.total, 0);
}

#[test]
fn auto_schedule_reports_failures_without_touching_them() {
    let p = planner();
    let huge = p
        .add_task(Task::new("u1", "huge").with_estimated_hours(10.0))
        .unwrap();
    let overdue = p
        .add_task(
            Task::new("u1", "overdue")
                .with_priority(Priority::Urgent)
                .with_deadline(at(1, 12, 0)),
        )
        .unwrap();
    let outcome = p
        .auto_schedule_pending(
            "u1",
            ScheduleWindow::days_ahead(at(2, 0, 0), 7).unwrap(),
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(outcome.total, 2);
    assert!(outcome.scheduled.is_empty());
    let reasons: Vec<_> = outcome.failed.iter().map(|f| f.reason).collect();
    assert_eq!(
        reasons,
        vec![FailureReason::DeadlinePassed, FailureReason::SlotUnavailable]
    );
    assert!(!p.get_task("u1", &huge.id).unwrap().is_scheduled());
    assert_eq!(p.get_task("u1", &overdue.id).unwrap().version, 0);
}

#[test]
fn missed_task_is_moved_before_its_deadline() {
    let p = planner();
    // yesterday 10-11, due tomorrow 23:59, today's morning partly busy
    let missed = p
        .add_task(
            Task::new("u1", "lab report")
                .with_schedule(slot(2, 10, 0, 11, 0))
                .with_deadline(at(4, 23, 59)),
        )
        .unwrap();
    p.add_task(Task::new("u1", "lecture").with_schedule(slot(3, 9, 0, 10, 0)))
        .unwrap();

    let moved = p
        .reschedule_missed("u1", at(3, 0, 0), &CancellationToken::new())
        .unwrap();
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].id, missed.id);
    assert_eq!(moved[0].interval(), Some(slot(3, 10, 0, 11, 0)));

    let stored = p.get_task("u1", &missed.id).unwrap();
    assert_eq!(stored.scheduled_start, Some(at(3, 10, 0)));
    assert!(stored.scheduled_end.unwrap() <= stored.deadline.unwrap());
}

#[test]
fn forty_five_hour_week_is_overloaded() {
    let p = planner();
    for d in 2..7 {
        p.add_task(Task::new("u1", format!("day {d}")).with_schedule(slot(d, 8, 0, 17, 0)))
            .unwrap();
    }
    let report = p.detect_overload("u1", at(2, 0, 0), None).unwrap();
    assert_eq!(report.total_hours, 45.0);
    assert!(report.is_overloaded);
    let warning = report.warning.unwrap();
    assert!(warning.contains("45.0"), "{warning}");
    assert!(warning.contains("40"), "{warning}");

    let json = serde_json::to_value(p.detect_overload("u1", at(2, 0, 0), None).unwrap()).unwrap();
    assert_eq!(json["isOverloaded"], true);
    assert_eq!(json["totalHours"], 45.0);
}

#[test]
fn ten_hour_task_never_fits_an_eight_hour_day() {
    let p = planner();
    let work = WorkHours::new(9, 17).unwrap();
    for days in [1, 7, 30, 365] {
        let found = p
            .find_slot("u1", at(2, 0, 0), at(2, 0, 0) + Duration::days(days), 10.0, Some(&work))
            .unwrap();
        assert!(found.is_none(), "found a slot within {days} days");
    }
}

#[test]
fn concurrent_manual_schedules_cannot_double_book() {
    let p = planner();
    let ids: Vec<String> = (0..6)
        .map(|i| p.add_task(Task::new("u1", format!("t{i}"))).unwrap().id)
        .collect();

    let shared = &p;
    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = ids
            .iter()
            .map(|id| s.spawn(move || shared.schedule_task("u1", id, slot(2, 14, 0, 15, 0))))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let ok = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(PlannerError::Conflict { .. })))
        .count();
    assert_eq!(ok, 1);
    assert_eq!(conflicts, 5);
}

#[test]
fn second_connection_cannot_double_book_or_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("studyplan.db");
    let first = SqliteTaskStore::open(&path).unwrap();
    let second = SqliteTaskStore::open(&path).unwrap();

    let a = first
        .insert(&Task::new("u1", "A").with_schedule(slot(2, 9, 0, 10, 0)))
        .unwrap();
    let b = second.insert(&Task::new("u1", "B")).unwrap();

    let mut clash = b.clone();
    clash.set_schedule(slot(2, 9, 30, 10, 30));
    assert!(matches!(
        second.save(&clash),
        Err(PlannerError::Conflict { .. })
    ));

    // both processes read A at version 0; only the first write lands
    let mut from_first = first.find_by_id("u1", &a.id).unwrap().unwrap();
    let mut from_second = second.find_by_id("u1", &a.id).unwrap().unwrap();
    from_first.status = TaskStatus::InProgress;
    from_second.status = TaskStatus::Completed;
    assert_eq!(first.save(&from_first).unwrap().version, 1);
    assert!(matches!(
        second.save(&from_second),
        Err(PlannerError::Stale { .. })
    ));
    assert_eq!(
        second.find_by_id("u1", &a.id).unwrap().unwrap().status,
        TaskStatus::InProgress
    );
}

#[test]
fn day_view_lists_scheduled_and_due_tasks() {
    let p = planner();
    let lecture = p
        .add_task(Task::new("u1", "lecture").with_schedule(slot(3, 14, 0, 15, 0)))
        .unwrap();
    let revision = p
        .add_task(
            Task::new("u1", "revision")
                .with_priority(Priority::High)
                .with_schedule(slot(3, 9, 0, 10, 0)),
        )
        .unwrap();
    let essay = p
        .add_task(Task::new("u1", "essay").with_deadline(at(3, 23, 0)))
        .unwrap();
    p.add_task(Task::new("u1", "next day").with_schedule(slot(4, 9, 0, 10, 0)))
        .unwrap();

    let view = p
        .day_view("u1", NaiveDate::from_ymd_opt(2026, 3, 3).unwrap())
        .unwrap();
    let ids: Vec<_> = view.tasks.iter().map(|t| t.id.clone()).collect();
    assert_eq!(ids, vec![essay.id, revision.id, lecture.id]);

    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["date"], "2026-03-03");
    assert_eq!(json["tasks"].as_array().unwrap().len(), 3);
}
