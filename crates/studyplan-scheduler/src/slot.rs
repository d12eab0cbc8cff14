//! Slot Finder: first conflict-free whole-hour slot inside the work window.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use studyplan_core::config::PlannerConfig;
use tracing::debug;

use crate::error::{PlannerError, Result};
use crate::store::TaskStore;
use crate::types::Interval;

/// Daily clock-time bounds within which slots may be placed.
///
/// Hours are local to `timezone`. `end_hour` may be 24 (midnight).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkHours {
    start_hour: u32,
    end_hour: u32,
    timezone: Tz,
    working_days: Vec<Weekday>,
}

impl Default for WorkHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 17,
            timezone: Tz::UTC,
            working_days: ALL_DAYS.to_vec(),
        }
    }
}

const ALL_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

impl WorkHours {
    /// UTC work hours on every day of the week.
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self> {
        if start_hour >= end_hour || end_hour > 24 {
            return Err(PlannerError::Validation(format!(
                "work hours {start_hour}-{end_hour} must satisfy start < end <= 24"
            )));
        }
        Ok(Self {
            start_hour,
            end_hour,
            ..Self::default()
        })
    }

    pub fn from_config(cfg: &PlannerConfig) -> Result<Self> {
        let timezone: Tz = cfg
            .timezone
            .parse()
            .map_err(|_| PlannerError::Validation(format!("invalid timezone: {}", cfg.timezone)))?;
        Self::new(cfg.work_start_hour, cfg.work_end_hour)?
            .in_timezone(timezone)
            .on_days(&cfg.working_days)
    }

    pub fn in_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn on_days(mut self, days: &[Weekday]) -> Result<Self> {
        if days.is_empty() {
            return Err(PlannerError::Validation(
                "at least one working day is required".to_string(),
            ));
        }
        self.working_days = days.to_vec();
        Ok(self)
    }

    pub fn start_hour(&self) -> u32 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u32 {
        self.end_hour
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Length of the nominal daily window.
    pub fn span(&self) -> Duration {
        Duration::hours(i64::from(self.end_hour - self.start_hour))
    }

    pub fn works_on(&self, day: Weekday) -> bool {
        self.working_days.contains(&day)
    }

    /// Calendar day of `instant` in the work-hours timezone.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }

    /// UTC bounds `[start, end)` of the local calendar day `day`.
    ///
    /// A day whose midnight falls in a DST gap starts at the first local
    /// hour that exists.
    pub fn day_bounds(&self, day: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let next = day
            .succ_opt()
            .ok_or_else(|| PlannerError::Validation(format!("no day follows {day}")))?;
        let start_of = |d: NaiveDate| {
            (0..3)
                .find_map(|hour| self.local_instant(d, hour))
                .ok_or_else(|| {
                    PlannerError::Validation(format!("{d} has no midnight in {}", self.timezone))
                })
        };
        Ok((start_of(day)?, start_of(next)?))
    }

    /// UTC instant of `hour:00` local time on `day`. `None` inside a DST gap.
    fn local_instant(&self, day: NaiveDate, hour: u32) -> Option<DateTime<Utc>> {
        let (day, hour) = if hour == 24 {
            (day.succ_opt()?, 0)
        } else {
            (day, hour)
        };
        let naive = day.and_hms_opt(hour, 0, 0)?;
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Convert fractional hours into a duration, rejecting non-positive values.
pub fn duration_from_hours(hours: f64) -> Result<Duration> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(PlannerError::Validation(format!(
            "duration must be a positive number of hours, got {hours}"
        )));
    }
    let millis = (hours * 3_600_000.0).round();
    if millis < 1.0 || millis > i64::MAX as f64 {
        return Err(PlannerError::Validation(format!(
            "duration of {hours} hours is out of range"
        )));
    }
    Ok(Duration::milliseconds(millis as i64))
}

/// Find the first free slot of `duration_hours` inside `[window_start, window_end)`.
///
/// Candidates start on whole local hours between `work.start_hour` and the
/// last hour that still lets the slot end by `work.end_hour`, day by day.
/// A candidate qualifies only if it lies entirely within the window and
/// overlaps no other live task of the user. The task named by
/// `exclude_task_id` is skipped, so a task can be moved without colliding
/// with its own old slot.
///
/// Returns `Ok(None)` when the window is exhausted.
pub fn find_slot<S: TaskStore + ?Sized>(
    store: &S,
    user_id: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    duration_hours: f64,
    work: &WorkHours,
    exclude_task_id: Option<&str>,
) -> Result<Option<Interval>> {
    let duration = duration_from_hours(duration_hours)?;
    if window_start >= window_end || duration > work.span() {
        return Ok(None);
    }

    let last_day = work.local_date(window_end);
    let mut day = work.local_date(window_start);
    let mut tried = 0usize;

    while day <= last_day {
        if work.works_on(day.weekday()) {
            if let Some(day_end) = work.local_instant(day, work.end_hour) {
                for hour in work.start_hour..work.end_hour {
                    let Some(start) = work.local_instant(day, hour) else {
                        continue;
                    };
                    let end = start + duration;
                    if end > day_end {
                        break;
                    }
                    if start < window_start {
                        continue;
                    }
                    if end > window_end {
                        debug!(user_id, tried, "slot search reached window end");
                        return Ok(None);
                    }
                    let candidate = Interval::new(start, end)?;
                    tried += 1;
                    if store
                        .find_overlapping(user_id, &candidate, exclude_task_id)?
                        .is_empty()
                    {
                        debug!(user_id, tried, start = %start, "slot found");
                        return Ok(Some(candidate));
                    }
                }
            }
        }
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    debug!(user_id, tried, "no slot in window");
    Ok(None)
}
