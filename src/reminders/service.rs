//! Tenant-scoped reminder operations, as invoked by a request handler.
//!
//! Every entry point receives the connection, the caller's `pharmacy_id`
//! and the [`SchedulerConfig`] explicitly. Mutations run in a single
//! transaction: read, plan, write, commit. A planning failure returns
//! before anything is written.

use chrono::{DateTime, Datelike};
use chrono_tz::Tz;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::db::{
    advance_reminder_next_due, fetch_active_reminder_items, get_reminder_for_pharmacy,
    get_reminder_item_for_pharmacy, insert_reminder, therapy_exists_for_pharmacy,
    transition_reminder_status, update_reminder_fields,
};
use crate::models::{AgendaFilter, AgendaItem, Frequency, NewReminder, Reminder, ReminderStatus};

use super::agenda::{partition_agenda, Agenda};
use super::error::ReminderError;
use super::frequency::{normalize_frequency, parse_frequency};
use super::lifecycle::{plan_cancel, plan_mark_done, Transition};
use super::schedule::parse_due_datetime;

/// Raw reminder payload for create and update, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReminderInput {
    pub therapy_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub frequency: Option<String>,
    pub interval_value: Option<i64>,
    pub weekday: Option<i64>,
    pub first_due_at: Option<String>,
}

/// Validate a payload into insertable fields.
///
/// - weekly without weekday takes the ISO weekday of `first_due_at`
/// - weekday is dropped for every other frequency
/// - `interval_value` defaults to 1 and never goes below 1
pub fn validate_input(input: &ReminderInput, tz: Tz) -> Result<NewReminder, ReminderError> {
    let title = input.title.as_deref().map(str::trim).unwrap_or_default();
    let frequency_raw = input
        .frequency
        .as_deref()
        .map(normalize_frequency)
        .unwrap_or_default();
    let first_due_raw = input.first_due_at.as_deref().map(str::trim).unwrap_or_default();

    let mut missing = Vec::new();
    if input.therapy_id.is_none() {
        missing.push("therapy_id");
    }
    if title.is_empty() {
        missing.push("title");
    }
    if frequency_raw.is_empty() {
        missing.push("frequency");
    }
    if first_due_raw.is_empty() {
        missing.push("first_due_at");
    }
    let Some(therapy_id) = input.therapy_id.filter(|_| missing.is_empty()) else {
        return Err(ReminderError::MissingFields(missing));
    };

    let frequency = parse_frequency(&frequency_raw)?;
    let first_due_at = parse_due_datetime(first_due_raw, tz)
        .ok_or_else(|| ReminderError::InvalidDateTime(first_due_raw.to_string()))?;

    let weekday = if frequency == Frequency::Weekly {
        let day = input
            .weekday
            .unwrap_or_else(|| i64::from(first_due_at.weekday().number_from_monday()));
        if !(1..=7).contains(&day) {
            return Err(ReminderError::InvalidWeekday(day));
        }
        u8::try_from(day).ok()
    } else {
        None
    };

    let interval_value = u32::try_from(input.interval_value.unwrap_or(1).max(1)).unwrap_or(u32::MAX);

    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    Ok(NewReminder {
        therapy_id,
        title: title.to_string(),
        description,
        frequency,
        interval_value,
        weekday,
        first_due_at,
    })
}

/// Create a reminder under one of the pharmacy's therapies.
pub fn create_reminder(
    conn: &Connection,
    pharmacy_id: i64,
    config: &SchedulerConfig,
    input: &ReminderInput,
) -> Result<Reminder, ReminderError> {
    create_reminder_inner(conn, pharmacy_id, config.timezone, input)
        .inspect_err(|err| log_failure("create", pharmacy_id, input.therapy_id, err))
}

fn create_reminder_inner(
    conn: &Connection,
    pharmacy_id: i64,
    tz: Tz,
    input: &ReminderInput,
) -> Result<Reminder, ReminderError> {
    let new = validate_input(input, tz)?;

    let tx = conn.unchecked_transaction()?;
    ensure_therapy(&tx, pharmacy_id, new.therapy_id)?;
    let reminder_id = insert_reminder(&tx, &new, tz)?;
    let reminder = load(&tx, pharmacy_id, reminder_id, tz)?;
    tx.commit()?;

    tracing::info!(
        pharmacy_id,
        reminder_id,
        therapy_id = new.therapy_id,
        frequency = new.frequency.as_str(),
        "Reminder created"
    );
    Ok(reminder)
}

/// Replace a reminder's editable fields.
///
/// `next_due_at` is kept when `first_due_at` is unchanged and resets to the
/// new `first_due_at` otherwise. Status is left as stored.
pub fn update_reminder(
    conn: &Connection,
    pharmacy_id: i64,
    config: &SchedulerConfig,
    reminder_id: i64,
    input: &ReminderInput,
) -> Result<Reminder, ReminderError> {
    update_reminder_inner(conn, pharmacy_id, config.timezone, reminder_id, input)
        .inspect_err(|err| log_failure("update", pharmacy_id, input.therapy_id, err))
}

fn update_reminder_inner(
    conn: &Connection,
    pharmacy_id: i64,
    tz: Tz,
    reminder_id: i64,
    input: &ReminderInput,
) -> Result<Reminder, ReminderError> {
    let new = validate_input(input, tz)?;

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let existing = load(&tx, pharmacy_id, reminder_id, tz)?;
    ensure_therapy(&tx, pharmacy_id, new.therapy_id)?;

    let next_due_at = if existing.first_due_at == new.first_due_at {
        existing.next_due_at.unwrap_or(new.first_due_at)
    } else {
        new.first_due_at
    };

    update_reminder_fields(&tx, pharmacy_id, reminder_id, &new, &next_due_at, tz)?;
    let reminder = load(&tx, pharmacy_id, reminder_id, tz)?;
    tx.commit()?;

    tracing::info!(pharmacy_id, reminder_id, therapy_id = new.therapy_id, "Reminder updated");
    Ok(reminder)
}

/// Fetch one reminder with its therapy and patient labels.
pub fn get_reminder(
    conn: &Connection,
    pharmacy_id: i64,
    config: &SchedulerConfig,
    reminder_id: i64,
) -> Result<AgendaItem, ReminderError> {
    get_reminder_item_for_pharmacy(conn, pharmacy_id, reminder_id, config.timezone)?
        .ok_or(ReminderError::NotFound { reminder_id })
}

/// Agenda of the pharmacy's active reminders relative to `now`.
pub fn agenda(
    conn: &Connection,
    pharmacy_id: i64,
    config: &SchedulerConfig,
    now: DateTime<Tz>,
    filter: &AgendaFilter,
) -> Result<Agenda<AgendaItem>, ReminderError> {
    let tz = config.timezone;
    let items = fetch_active_reminder_items(conn, pharmacy_id, filter, tz)
        .inspect_err(|err| tracing::error!(pharmacy_id, %err, "Agenda query failed"))?;
    let agenda = partition_agenda(now.with_timezone(&tz), items);

    tracing::debug!(
        pharmacy_id,
        overdue = agenda.overdue.len(),
        today = agenda.today.len(),
        upcoming = agenda.upcoming.len(),
        "Agenda built"
    );
    Ok(agenda)
}

/// Mark a reminder done.
///
/// One-shot reminders become `done`. Recurring reminders advance by one
/// period from their stored `next_due_at` and stay `active`; if the stored
/// value changed since it was read, nothing is written and
/// [`ReminderError::ConcurrentModification`] is returned. Reminders already
/// `done` or `cancelled` come back unchanged.
pub fn mark_done(
    conn: &Connection,
    pharmacy_id: i64,
    config: &SchedulerConfig,
    reminder_id: i64,
) -> Result<Reminder, ReminderError> {
    apply_transition(conn, pharmacy_id, config.timezone, reminder_id, "mark_done", plan_mark_done)
}

/// Soft-cancel a reminder. The row is kept with status `cancelled`.
pub fn cancel_reminder(
    conn: &Connection,
    pharmacy_id: i64,
    config: &SchedulerConfig,
    reminder_id: i64,
) -> Result<Reminder, ReminderError> {
    apply_transition(conn, pharmacy_id, config.timezone, reminder_id, "cancel", |r| {
        Ok(plan_cancel(r))
    })
}

/// Delete is a soft cancel; history is retained.
pub fn delete_reminder(
    conn: &Connection,
    pharmacy_id: i64,
    config: &SchedulerConfig,
    reminder_id: i64,
) -> Result<Reminder, ReminderError> {
    apply_transition(conn, pharmacy_id, config.timezone, reminder_id, "delete", |r| {
        Ok(plan_cancel(r))
    })
}

fn apply_transition<F>(
    conn: &Connection,
    pharmacy_id: i64,
    tz: Tz,
    reminder_id: i64,
    op: &'static str,
    plan: F,
) -> Result<Reminder, ReminderError>
where
    F: FnOnce(&Reminder) -> Result<Transition, ReminderError>,
{
    let mut therapy_id = None;
    let result = (|| -> Result<Reminder, ReminderError> {
        // Immediate: take the write lock before reading the base timestamp
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let reminder = load(&tx, pharmacy_id, reminder_id, tz)?;
        therapy_id = Some(reminder.therapy_id);

        let transition = plan(&reminder)?;
        if transition.is_noop() {
            tracing::debug!(
                pharmacy_id,
                reminder_id,
                status = reminder.status.as_str(),
                op,
                "No transition from terminal state"
            );
            return Ok(reminder);
        }

        let affected = persist_transition(&tx, pharmacy_id, &reminder, &transition, tz)?;
        if affected == 0 {
            return Err(ReminderError::ConcurrentModification { reminder_id });
        }

        let updated = load(&tx, pharmacy_id, reminder_id, tz)?;
        tx.commit()?;

        tracing::info!(
            pharmacy_id,
            reminder_id,
            therapy_id = updated.therapy_id,
            status = updated.status.as_str(),
            op,
            "Reminder transitioned"
        );
        Ok(updated)
    })();

    result.inspect_err(|err| log_failure(op, pharmacy_id, therapy_id, err))
}

fn persist_transition(
    conn: &Connection,
    pharmacy_id: i64,
    reminder: &Reminder,
    transition: &Transition,
    tz: Tz,
) -> Result<usize, ReminderError> {
    let affected = match transition {
        Transition::Completed => transition_reminder_status(
            conn,
            pharmacy_id,
            reminder.id,
            ReminderStatus::Active,
            ReminderStatus::Done,
        )?,
        Transition::Cancelled => transition_reminder_status(
            conn,
            pharmacy_id,
            reminder.id,
            ReminderStatus::Active,
            ReminderStatus::Cancelled,
        )?,
        Transition::Rescheduled { next_due_at } => advance_reminder_next_due(
            conn,
            pharmacy_id,
            reminder.id,
            reminder.next_due_at.as_ref(),
            next_due_at,
            tz,
        )?,
        Transition::Unchanged { .. } => 0,
    };
    Ok(affected)
}

fn load(conn: &Connection, pharmacy_id: i64, reminder_id: i64, tz: Tz) -> Result<Reminder, ReminderError> {
    get_reminder_for_pharmacy(conn, pharmacy_id, reminder_id, tz)?
        .ok_or(ReminderError::NotFound { reminder_id })
}

fn ensure_therapy(conn: &Connection, pharmacy_id: i64, therapy_id: i64) -> Result<(), ReminderError> {
    if therapy_exists_for_pharmacy(conn, pharmacy_id, therapy_id)? {
        Ok(())
    } else {
        Err(ReminderError::TherapyNotFound { therapy_id })
    }
}

fn log_failure(op: &str, pharmacy_id: i64, therapy_id: Option<i64>, err: &ReminderError) {
    if err.is_client_error() {
        tracing::warn!(op, pharmacy_id, ?therapy_id, code = err.code(), %err, "Reminder request rejected");
    } else {
        tracing::error!(op, pharmacy_id, ?therapy_id, %err, "Reminder operation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_patient, insert_therapy, open_memory_database};
    use crate::db::{format_db_timestamp, DatabaseError};
    use crate::models::{NewPatient, NewTherapy};
    use crate::reminders::schedule::resolve_local;
    use chrono::NaiveDate;
    use chrono_tz::Europe::Rome;

    const PHARMACY: i64 = 10;
    const OTHER_PHARMACY: i64 = 20;

    fn config() -> SchedulerConfig {
        SchedulerConfig::new(Rome)
    }

    fn at(raw: &str) -> DateTime<Tz> {
        parse_due_datetime(raw, Rome).unwrap()
    }

    fn setup() -> (Connection, i64) {
        let conn = open_memory_database().unwrap();
        let therapy_id = make_therapy(&conn, PHARMACY, "Anna", "Verdi", "BPCO");
        (conn, therapy_id)
    }

    fn make_therapy(conn: &Connection, pharmacy_id: i64, first: &str, last: &str, title: &str) -> i64 {
        let patient_id = insert_patient(conn, &NewPatient {
            pharmacy_id,
            first_name: first.into(),
            last_name: last.into(),
        }).unwrap();
        insert_therapy(conn, &NewTherapy {
            pharmacy_id,
            patient_id: Some(patient_id),
            therapy_title: title.into(),
        }).unwrap()
    }

    fn input(therapy_id: i64, frequency: &str, first_due_at: &str) -> ReminderInput {
        ReminderInput {
            therapy_id: Some(therapy_id),
            title: Some("  Follow-up aderenza  ".into()),
            description: None,
            frequency: Some(frequency.into()),
            interval_value: None,
            weekday: None,
            first_due_at: Some(first_due_at.into()),
        }
    }

    fn count_reminders(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM therapy_reminders", [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn create_weekly_defaults_weekday_from_first_due() {
        let (conn, therapy_id) = setup();
        // 2025-01-01 is a Wednesday
        let reminder = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "weekly", "2025-01-01T10:00")).unwrap();

        assert_eq!(reminder.title, "Follow-up aderenza");
        assert_eq!(reminder.frequency, Frequency::Weekly);
        assert_eq!(reminder.weekday, Some(3));
        assert_eq!(reminder.interval_value, 1);
        assert_eq!(reminder.status, ReminderStatus::Active);
        assert_eq!(reminder.next_due_at, Some(reminder.first_due_at));
    }

    #[test]
    fn create_normalizes_frequency_and_drops_weekday() {
        let (conn, therapy_id) = setup();
        let mut payload = input(therapy_id, " Once ", "2025-01-01 10:00");
        payload.weekday = Some(5);
        payload.description = Some("   ".into());

        let reminder = create_reminder(&conn, PHARMACY, &config(), &payload).unwrap();
        assert_eq!(reminder.frequency, Frequency::OneShot);
        assert_eq!(reminder.weekday, None);
        assert_eq!(reminder.description, None);
    }

    #[test]
    fn create_clamps_interval() {
        let (conn, therapy_id) = setup();
        let mut payload = input(therapy_id, "monthly", "2025-01-31 09:00:00");
        payload.interval_value = Some(-3);

        let reminder = create_reminder(&conn, PHARMACY, &config(), &payload).unwrap();
        assert_eq!(reminder.interval_value, 1);
    }

    #[test]
    fn create_reports_all_missing_fields() {
        let (conn, _) = setup();
        let payload = ReminderInput {
            title: Some("   ".into()),
            ..ReminderInput::default()
        };

        match create_reminder(&conn, PHARMACY, &config(), &payload) {
            Err(ReminderError::MissingFields(fields)) => {
                assert_eq!(fields, vec!["therapy_id", "title", "frequency", "first_due_at"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(count_reminders(&conn), 0);
    }

    #[test]
    fn create_rejects_invalid_values_without_writing() {
        let (conn, therapy_id) = setup();

        let err = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "daily", "2025-01-01 10:00")).unwrap_err();
        assert!(matches!(err, ReminderError::InvalidFrequency(ref f) if f == "daily"));

        let err = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "weekly", "2025-13-01 09:00")).unwrap_err();
        assert!(matches!(err, ReminderError::InvalidDateTime(_)));
        assert_eq!(err.code(), "REMINDER_INVALID_DATETIME");

        let mut bad_day = input(therapy_id, "weekly", "2025-01-01 10:00");
        bad_day.weekday = Some(8);
        let err = create_reminder(&conn, PHARMACY, &config(), &bad_day).unwrap_err();
        assert!(matches!(err, ReminderError::InvalidWeekday(8)));

        assert_eq!(count_reminders(&conn), 0);
    }

    #[test]
    fn create_rejects_therapy_of_other_pharmacy() {
        let (conn, _) = setup();
        let foreign = make_therapy(&conn, OTHER_PHARMACY, "Paolo", "Neri", "Diabete");

        let err = create_reminder(&conn, PHARMACY, &config(), &input(foreign, "weekly", "2025-01-01 10:00")).unwrap_err();
        assert!(matches!(err, ReminderError::TherapyNotFound { therapy_id } if therapy_id == foreign));
        assert_eq!(count_reminders(&conn), 0);
    }

    #[test]
    fn mark_done_one_shot_is_terminal() {
        let (conn, therapy_id) = setup();
        let created = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "one-shot", "2025-01-01 10:00")).unwrap();

        let done = mark_done(&conn, PHARMACY, &config(), created.id).unwrap();
        assert_eq!(done.status, ReminderStatus::Done);
        assert_eq!(done.next_due_at, created.next_due_at);

        // Second completion is a no-op
        let again = mark_done(&conn, PHARMACY, &config(), created.id).unwrap();
        assert_eq!(again, done);
    }

    #[test]
    fn mark_done_weekly_advances_one_week() {
        let (conn, therapy_id) = setup();
        let created = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "weekly", "2025-01-01 10:00")).unwrap();

        let advanced = mark_done(&conn, PHARMACY, &config(), created.id).unwrap();
        assert_eq!(advanced.status, ReminderStatus::Active);
        assert_eq!(advanced.next_due_at, Some(at("2025-01-08 10:00")));
        assert_eq!(advanced.first_due_at, at("2025-01-01 10:00"));
    }

    #[test]
    fn mark_done_monthly_steps_one_period_per_call() {
        let (conn, therapy_id) = setup();
        let created = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "monthly", "2024-01-31 09:00")).unwrap();

        let first = mark_done(&conn, PHARMACY, &config(), created.id).unwrap();
        assert_eq!(first.next_due_at, Some(at("2024-02-29 09:00")));
        let second = mark_done(&conn, PHARMACY, &config(), created.id).unwrap();
        assert_eq!(second.next_due_at, Some(at("2024-03-29 09:00")));
    }

    #[test]
    fn cancel_and_delete_are_soft() {
        let (conn, therapy_id) = setup();
        let a = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "weekly", "2025-01-01 10:00")).unwrap();
        let b = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "monthly", "2025-01-01 10:00")).unwrap();

        let cancelled = cancel_reminder(&conn, PHARMACY, &config(), a.id).unwrap();
        assert_eq!(cancelled.status, ReminderStatus::Cancelled);
        let deleted = delete_reminder(&conn, PHARMACY, &config(), b.id).unwrap();
        assert_eq!(deleted.status, ReminderStatus::Cancelled);
        assert_eq!(count_reminders(&conn), 2);

        // Nothing leaves cancelled
        let unchanged = mark_done(&conn, PHARMACY, &config(), a.id).unwrap();
        assert_eq!(unchanged.status, ReminderStatus::Cancelled);
        assert_eq!(unchanged.next_due_at, a.next_due_at);
    }

    #[test]
    fn operations_are_tenant_scoped() {
        let (conn, therapy_id) = setup();
        let created = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "weekly", "2025-01-01 10:00")).unwrap();

        for result in [
            mark_done(&conn, OTHER_PHARMACY, &config(), created.id),
            cancel_reminder(&conn, OTHER_PHARMACY, &config(), created.id),
        ] {
            assert!(matches!(result, Err(ReminderError::NotFound { .. })));
        }
        assert!(matches!(
            get_reminder(&conn, OTHER_PHARMACY, &config(), created.id),
            Err(ReminderError::NotFound { .. })
        ));

        let stored = get_reminder(&conn, PHARMACY, &config(), created.id).unwrap();
        assert_eq!(stored.reminder, created);
        assert_eq!(stored.therapy_title, "BPCO");
        assert_eq!(stored.patient_first_name.as_deref(), Some("Anna"));
    }

    #[test]
    fn update_keeps_progress_when_first_due_unchanged() {
        let (conn, therapy_id) = setup();
        let created = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "weekly", "2025-01-01 10:00")).unwrap();
        mark_done(&conn, PHARMACY, &config(), created.id).unwrap();

        let mut edit = input(therapy_id, "weekly", "2025-01-01T10:00");
        edit.title = Some("Nuovo titolo".into());
        let updated = update_reminder(&conn, PHARMACY, &config(), created.id, &edit).unwrap();
        assert_eq!(updated.title, "Nuovo titolo");
        assert_eq!(updated.next_due_at, Some(at("2025-01-08 10:00")));
    }

    #[test]
    fn update_resets_next_due_when_first_due_moves() {
        let (conn, therapy_id) = setup();
        let created = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "weekly", "2025-01-01 10:00")).unwrap();
        mark_done(&conn, PHARMACY, &config(), created.id).unwrap();

        let updated = update_reminder(&conn, PHARMACY, &config(), created.id, &input(therapy_id, "bi-weekly", "2025-02-03 08:00")).unwrap();
        assert_eq!(updated.frequency, Frequency::Biweekly);
        assert_eq!(updated.weekday, None);
        assert_eq!(updated.first_due_at, at("2025-02-03 08:00"));
        assert_eq!(updated.next_due_at, Some(at("2025-02-03 08:00")));
    }

    #[test]
    fn update_missing_reminder_is_not_found() {
        let (conn, therapy_id) = setup();
        let err = update_reminder(&conn, PHARMACY, &config(), 404, &input(therapy_id, "weekly", "2025-01-01 10:00")).unwrap_err();
        assert!(matches!(err, ReminderError::NotFound { reminder_id: 404 }));
    }

    #[test]
    fn agenda_partitions_active_reminders() {
        let (conn, therapy_id) = setup();
        let other_therapy = make_therapy(&conn, PHARMACY, "Giorgio", "Blu", "Ipertensione");
        let now = at("2025-06-10 14:00");

        let overdue = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "weekly", "2025-06-10 13:00")).unwrap();
        let today = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "monthly", "2025-06-10 14:30")).unwrap();
        let upcoming = create_reminder(&conn, PHARMACY, &config(), &input(other_therapy, "once", "2025-06-11 15:00")).unwrap();
        let done = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "once", "2025-06-10 14:00")).unwrap();
        mark_done(&conn, PHARMACY, &config(), done.id).unwrap();

        let agenda = agenda(&conn, PHARMACY, &config(), now, &AgendaFilter::default()).unwrap();
        let ids = |items: &[AgendaItem]| items.iter().map(|i| i.reminder.id).collect::<Vec<_>>();
        assert_eq!(ids(&agenda.overdue), vec![overdue.id]);
        assert_eq!(ids(&agenda.today), vec![today.id]);
        assert_eq!(ids(&agenda.upcoming), vec![upcoming.id]);
        assert_eq!(agenda.upcoming[0].therapy_title, "Ipertensione");

        let filtered = super::agenda(&conn, PHARMACY, &config(), now, &AgendaFilter {
            therapy_id: Some(other_therapy),
            patient_id: None,
        }).unwrap();
        assert_eq!(filtered.len(), 1);

        let foreign = super::agenda(&conn, OTHER_PHARMACY, &config(), now, &AgendaFilter::default()).unwrap();
        assert!(foreign.is_empty());
    }

    #[test]
    fn agenda_accepts_now_in_any_zone() {
        let (conn, therapy_id) = setup();
        let due = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "once", "2025-06-10 23:30")).unwrap();

        // 21:00 UTC is 23:00 in Rome: the reminder is still "today"
        let now_utc = at("2025-06-10 23:00").with_timezone(&chrono_tz::UTC);
        let agenda = agenda(&conn, PHARMACY, &config(), now_utc, &AgendaFilter::default()).unwrap();
        assert_eq!(agenda.today.len(), 1);
        assert_eq!(agenda.today[0].reminder.id, due.id);
    }

    fn stored_row(conn: &Connection, reminder_id: i64) -> (String, Option<String>, String) {
        conn.query_row(
            "SELECT first_due_at, next_due_at, status FROM therapy_reminders WHERE id = ?1",
            [reminder_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap()
    }

    #[test]
    fn mark_done_scheduling_error_writes_nothing() {
        let (conn, therapy_id) = setup();
        let created = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "monthly", "2025-01-15 09:00")).unwrap();

        // Last representable month: one more period overflows the calendar
        let edge = NaiveDate::from_ymd_opt(262143, 12, 15).unwrap().and_hms_opt(9, 0, 0).unwrap();
        let edge_text = format_db_timestamp(&resolve_local(Rome, edge).unwrap(), Rome);
        conn.execute(
            "UPDATE therapy_reminders SET next_due_at = ?1 WHERE id = ?2",
            rusqlite::params![edge_text, created.id],
        )
        .unwrap();
        let before = stored_row(&conn, created.id);

        let err = mark_done(&conn, PHARMACY, &config(), created.id).unwrap_err();
        assert!(matches!(err, ReminderError::SchedulingError { reminder_id } if reminder_id == created.id));
        assert_eq!(err.status_code(), 422);
        assert_eq!(stored_row(&conn, created.id), before);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn stale_next_due_rolls_back_with_conflict() {
        let (conn, therapy_id) = setup();
        let created = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "weekly", "2025-01-01 10:00")).unwrap();
        let before = stored_row(&conn, created.id);

        // Another completion lands between the read and the conditional write
        let err = apply_transition(&conn, PHARMACY, Rome, created.id, "mark_done", |reminder| {
            conn.execute(
                "UPDATE therapy_reminders SET next_due_at = '2025-01-08 10:00:00' WHERE id = ?1",
                [reminder.id],
            )
            .unwrap();
            plan_mark_done(reminder)
        })
        .unwrap_err();

        assert!(matches!(err, ReminderError::ConcurrentModification { reminder_id } if reminder_id == created.id));
        assert_eq!(err.code(), "REMINDER_CONFLICT");
        // The interleaved write shared the transaction and was rolled back with it
        assert_eq!(stored_row(&conn, created.id), before);
        assert!(conn.is_autocommit());

        let advanced = mark_done(&conn, PHARMACY, &config(), created.id).unwrap();
        assert_eq!(advanced.next_due_at, Some(at("2025-01-08 10:00")));
    }

    #[test]
    fn stale_status_is_a_conflict() {
        let (conn, therapy_id) = setup();
        let created = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "once", "2025-01-01 10:00")).unwrap();

        let err = apply_transition(&conn, PHARMACY, Rome, created.id, "cancel", |reminder| {
            conn.execute(
                "UPDATE therapy_reminders SET status = 'done' WHERE id = ?1",
                [reminder.id],
            )
            .unwrap();
            Ok(plan_cancel(reminder))
        })
        .unwrap_err();

        assert!(matches!(err, ReminderError::ConcurrentModification { .. }));
        assert_eq!(stored_row(&conn, created.id).2, "active");
    }

    #[test]
    fn non_canonical_stored_due_is_reported_not_retried() {
        let (conn, therapy_id) = setup();
        let created = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "weekly", "2025-01-01 10:00")).unwrap();
        conn.execute(
            "UPDATE therapy_reminders SET next_due_at = '2025-1-08 10:00:00' WHERE id = ?1",
            [created.id],
        )
        .unwrap();

        let err = mark_done(&conn, PHARMACY, &config(), created.id).unwrap_err();
        assert!(matches!(
            err,
            ReminderError::Database(DatabaseError::InvalidTimestamp { ref field, .. }) if field == "next_due_at"
        ));
        assert_eq!(stored_row(&conn, created.id).1.as_deref(), Some("2025-1-08 10:00:00"));
    }

    #[test]
    fn leap_second_input_rejected_at_create() {
        let (conn, therapy_id) = setup();
        let err = create_reminder(&conn, PHARMACY, &config(), &input(therapy_id, "weekly", "2025-01-01 09:00:60")).unwrap_err();
        assert!(matches!(err, ReminderError::InvalidDateTime(ref raw) if raw == "2025-01-01 09:00:60"));
        assert_eq!(count_reminders(&conn), 0);
    }
}
