//! Due-date parsing and next-occurrence arithmetic.
//!
//! All calendar math runs on the local wall-clock time of the reminder's
//! zone and is re-localized through `chrono-tz`, so a 09:00 reminder stays
//! at 09:00 across daylight-saving changes.

use chrono::{DateTime, Days, LocalResult, Months, NaiveDateTime, TimeDelta, TimeZone, Timelike};
use chrono_tz::Tz;

use crate::models::Frequency;

/// Accepted input formats, tried in order. First strict match wins.
pub const DUE_DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Localize a wall-clock time in `tz`.
///
/// Ambiguous times (clocks going back) resolve to the earlier instant.
/// Times inside a spring-forward gap move one hour ahead, i.e. to the
/// reading the wall clock shows after the jump.
pub fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(first, second) => Some(first.min(second)),
        LocalResult::None => {
            let shifted = naive.checked_add_signed(TimeDelta::hours(1))?;
            tz.from_local_datetime(&shifted).earliest()
        }
    }
}

/// Parse a user-supplied due date in `tz`.
///
/// Returns `None` for empty input, for strings matching none of
/// [`DUE_DATETIME_FORMATS`], and for calendar-invalid components
/// (month 13, February 30, second 60). Partial matches are rejected: the parsed value
/// must format back to exactly the trimmed input.
pub fn parse_due_datetime(raw: &str, tz: Tz) -> Option<DateTime<Tz>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DUE_DATETIME_FORMATS
        .iter()
        .find_map(|format| {
            let naive = NaiveDateTime::parse_from_str(raw, format).ok()?;
            // `:60` parses as a leap second; reject it like any other out-of-range field
            let in_range = naive.nanosecond() < 1_000_000_000;
            (in_range && naive.format(format).to_string() == raw).then_some(naive)
        })
        .and_then(|naive| resolve_local(tz, naive))
}

/// Add `months` calendar months, keeping the day-of-month clamped to the
/// last day of the target month and the time-of-day unchanged.
pub fn add_months_keep_day(dt: DateTime<Tz>, months: u32) -> Option<DateTime<Tz>> {
    // NaiveDateTime::checked_add_months clamps Jan 31 + 1 to Feb 28/29
    let local = dt.naive_local().checked_add_months(Months::new(months))?;
    resolve_local(dt.timezone(), local)
}

fn add_days_keep_time(dt: DateTime<Tz>, days: u64) -> Option<DateTime<Tz>> {
    let local = dt.naive_local().checked_add_days(Days::new(days))?;
    resolve_local(dt.timezone(), local)
}

/// Next occurrence after `base` for the given frequency.
///
/// `interval_value` below 1 counts as 1. `one_shot` returns `base`
/// unchanged; callers must not reschedule it. Returns `None` when there is
/// no base or the result falls outside the supported calendar range.
pub fn compute_next_due(
    frequency: Frequency,
    interval_value: i64,
    base: Option<DateTime<Tz>>,
) -> Option<DateTime<Tz>> {
    let base = base?;
    let interval = u32::try_from(interval_value.max(1)).ok()?;

    match frequency {
        Frequency::OneShot => Some(base),
        Frequency::Weekly => add_days_keep_time(base, 7 * u64::from(interval)),
        Frequency::Biweekly => add_days_keep_time(base, 14 * u64::from(interval)),
        Frequency::Monthly => add_months_keep_day(base, interval),
    }
}
