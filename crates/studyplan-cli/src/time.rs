//! Date/time arguments.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

const LOCAL_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse an instant given on the command line.
///
/// Accepts `now`, RFC 3339 with an offset, a local date-time without one
/// (read in `tz`), or a bare date (local midnight).
pub fn parse_instant(input: &str, tz: Tz) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("now") {
        return Ok(Utc::now());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| anyhow!("cannot parse {input:?} as a date or date-time"))?;
    local_to_utc(naive, tz)
}

/// Local midnight of the Monday on or before `now`, in `tz`.
pub fn start_of_week(now: DateTime<Utc>, tz: Tz) -> Result<DateTime<Utc>> {
    let today = now.with_timezone(&tz).date_naive();
    let monday = today
        .checked_sub_days(Days::new(u64::from(today.weekday().num_days_from_monday())))
        .ok_or_else(|| anyhow!("no Monday before {today}"))?;
    let midnight = monday
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid date {monday}"))?;
    local_to_utc(midnight, tz)
}

fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>> {
    match tz.from_local_datetime(&naive).earliest() {
        Some(dt) => Ok(dt.with_timezone(&Utc)),
        None => bail!("{naive} does not exist in {tz}"),
    }
}
