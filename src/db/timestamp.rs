//! Stored timestamp format.
//!
//! Reminder timestamps persist as wall-clock text in the scheduler
//! timezone (`YYYY-MM-DD HH:MM:SS`) and are re-localized on read.

use chrono::{DateTime, NaiveDateTime, Timelike};
use chrono_tz::Tz;

use super::DatabaseError;
use crate::reminders::schedule::resolve_local;

pub const DB_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render `dt` as stored text in `tz`.
pub fn format_db_timestamp(dt: &DateTime<Tz>, tz: Tz) -> String {
    dt.with_timezone(&tz).format(DB_TIMESTAMP_FORMAT).to_string()
}

/// Read stored text back as a zoned timestamp.
///
/// Only text [`format_db_timestamp`] could have written is accepted, so the
/// value re-rendered for a conditional `UPDATE` matches the stored bytes.
/// Unpadded fields, leap seconds and wall times skipped by a DST jump are
/// reported as [`DatabaseError::InvalidTimestamp`].
pub fn parse_db_timestamp(field: &str, raw: &str, tz: Tz) -> Result<DateTime<Tz>, DatabaseError> {
    let invalid = || DatabaseError::InvalidTimestamp {
        field: field.into(),
        value: raw.into(),
    };
    let naive = NaiveDateTime::parse_from_str(raw, DB_TIMESTAMP_FORMAT).map_err(|_| invalid())?;
    if naive.nanosecond() >= 1_000_000_000 || naive.format(DB_TIMESTAMP_FORMAT).to_string() != raw {
        return Err(invalid());
    }
    resolve_local(tz, naive)
        .filter(|dt| dt.naive_local() == naive)
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::Rome;

    #[test]
    fn stored_text_round_trips() {
        let dt = Rome.with_ymd_and_hms(2025, 7, 4, 8, 30, 0).unwrap();
        let stored = format_db_timestamp(&dt, Rome);
        assert_eq!(stored, "2025-07-04 08:30:00");
        assert_eq!(parse_db_timestamp("next_due_at", &stored, Rome).unwrap(), dt);
    }

    #[test]
    fn format_converts_into_target_zone() {
        let utc = chrono_tz::UTC.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(format_db_timestamp(&utc, Rome), "2025-01-01 13:00:00");
    }

    #[test]
    fn non_canonical_text_rejected() {
        for raw in [
            "2025-1-05 09:00:00",
            "2025-01-05 9:00:00",
            "2025-01-01 09:00:60",
            // Skipped by the spring-forward jump in Rome
            "2025-03-30 02:30:00",
        ] {
            assert!(
                matches!(
                    parse_db_timestamp("next_due_at", raw, Rome),
                    Err(DatabaseError::InvalidTimestamp { .. })
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn ambiguous_wall_time_reads_back() {
        // 02:30 occurs twice when Rome falls back
        let dt = parse_db_timestamp("next_due_at", "2025-10-26 02:30:00", Rome).unwrap();
        assert_eq!(format_db_timestamp(&dt, Rome), "2025-10-26 02:30:00");
    }

    #[test]
    fn garbage_reports_field() {
        match parse_db_timestamp("first_due_at", "yesterday", Rome) {
            Err(DatabaseError::InvalidTimestamp { field, value }) => {
                assert_eq!(field, "first_due_at");
                assert_eq!(value, "yesterday");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
