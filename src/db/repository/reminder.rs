use std::str::FromStr;

use chrono::DateTime;
use chrono_tz::Tz;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{format_db_timestamp, parse_db_timestamp, DatabaseError};
use crate::models::*;

/// Ownership predicate: a reminder belongs to a pharmacy through its therapy.
const TENANT_SCOPE: &str = "therapy_id IN (SELECT id FROM therapies WHERE pharmacy_id = ?)";

const ITEM_SELECT: &str =
    "SELECT r.id, r.therapy_id, r.title, r.description, r.frequency, r.interval_value,
            r.weekday, r.first_due_at, r.next_due_at, r.status,
            t.therapy_title, t.patient_id, p.first_name, p.last_name
     FROM therapy_reminders r
     JOIN therapies t ON r.therapy_id = t.id
     LEFT JOIN patients p ON t.patient_id = p.id";

/// Insert a validated reminder. `next_due_at` starts at `first_due_at`.
pub fn insert_reminder(conn: &Connection, reminder: &NewReminder, tz: Tz) -> Result<i64, DatabaseError> {
    let first_due = format_db_timestamp(&reminder.first_due_at, tz);
    conn.execute(
        "INSERT INTO therapy_reminders (therapy_id, title, description, frequency, interval_value,
         weekday, first_due_at, next_due_at, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8)",
        params![
            reminder.therapy_id,
            reminder.title,
            reminder.description,
            reminder.frequency.as_str(),
            reminder.interval_value,
            reminder.weekday,
            first_due,
            ReminderStatus::Active.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_reminder_for_pharmacy(
    conn: &Connection,
    pharmacy_id: i64,
    reminder_id: i64,
    tz: Tz,
) -> Result<Option<Reminder>, DatabaseError> {
    Ok(get_reminder_item_for_pharmacy(conn, pharmacy_id, reminder_id, tz)?.map(|item| item.reminder))
}

/// Reminder joined with its therapy title and patient.
pub fn get_reminder_item_for_pharmacy(
    conn: &Connection,
    pharmacy_id: i64,
    reminder_id: i64,
    tz: Tz,
) -> Result<Option<AgendaItem>, DatabaseError> {
    let sql = format!("{ITEM_SELECT} WHERE r.id = ?1 AND t.pharmacy_id = ?2");
    let row = conn
        .query_row(&sql, params![reminder_id, pharmacy_id], item_row_from_rusqlite)
        .optional()?;
    row.map(|row| item_from_row(row, tz)).transpose()
}

/// Overwrite the editable fields of a reminder. Returns affected rows.
pub fn update_reminder_fields(
    conn: &Connection,
    pharmacy_id: i64,
    reminder_id: i64,
    reminder: &NewReminder,
    next_due_at: &DateTime<Tz>,
    tz: Tz,
) -> Result<usize, DatabaseError> {
    let sql = format!(
        "UPDATE therapy_reminders
         SET therapy_id = ?, title = ?, description = ?, frequency = ?, interval_value = ?,
             weekday = ?, first_due_at = ?, next_due_at = ?
         WHERE id = ? AND {TENANT_SCOPE}"
    );
    let affected = conn.execute(
        &sql,
        params![
            reminder.therapy_id,
            reminder.title,
            reminder.description,
            reminder.frequency.as_str(),
            reminder.interval_value,
            reminder.weekday,
            format_db_timestamp(&reminder.first_due_at, tz),
            format_db_timestamp(next_due_at, tz),
            reminder_id,
            pharmacy_id,
        ],
    )?;
    Ok(affected)
}

/// Move a reminder from `from` to `to`. Zero affected rows means the stored
/// status no longer matched `from`.
pub fn transition_reminder_status(
    conn: &Connection,
    pharmacy_id: i64,
    reminder_id: i64,
    from: ReminderStatus,
    to: ReminderStatus,
) -> Result<usize, DatabaseError> {
    let sql = format!(
        "UPDATE therapy_reminders SET status = ?
         WHERE id = ? AND status = ? AND {TENANT_SCOPE}"
    );
    let affected = conn.execute(
        &sql,
        params![to.as_str(), reminder_id, from.as_str(), pharmacy_id],
    )?;
    Ok(affected)
}

/// Advance `next_due_at`, conditioned on the stored value still being
/// `expected` (optimistic check against concurrent completions).
pub fn advance_reminder_next_due(
    conn: &Connection,
    pharmacy_id: i64,
    reminder_id: i64,
    expected: Option<&DateTime<Tz>>,
    next_due_at: &DateTime<Tz>,
    tz: Tz,
) -> Result<usize, DatabaseError> {
    let sql = format!(
        "UPDATE therapy_reminders SET next_due_at = ?, status = 'active'
         WHERE id = ? AND status = 'active' AND next_due_at IS ? AND {TENANT_SCOPE}"
    );
    let affected = conn.execute(
        &sql,
        params![
            format_db_timestamp(next_due_at, tz),
            reminder_id,
            expected.map(|dt| format_db_timestamp(dt, tz)),
            pharmacy_id,
        ],
    )?;
    Ok(affected)
}

/// Active reminders of one pharmacy, ascending by `next_due_at`.
pub fn fetch_active_reminder_items(
    conn: &Connection,
    pharmacy_id: i64,
    filter: &AgendaFilter,
    tz: Tz,
) -> Result<Vec<AgendaItem>, DatabaseError> {
    let mut sql = format!("{ITEM_SELECT} WHERE t.pharmacy_id = ?1 AND r.status = 'active'");

    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(pharmacy_id)];
    let mut param_idx = 2;

    if let Some(therapy_id) = filter.therapy_id {
        sql.push_str(&format!(" AND t.id = ?{param_idx}"));
        params_vec.push(Box::new(therapy_id));
        param_idx += 1;
    }

    if let Some(patient_id) = filter.patient_id {
        sql.push_str(&format!(" AND t.patient_id = ?{param_idx}"));
        params_vec.push(Box::new(patient_id));
    }

    sql.push_str(" ORDER BY r.next_due_at ASC, r.id ASC");

    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), item_row_from_rusqlite)?;

    let mut items = Vec::new();
    for row in rows {
        items.push(item_from_row(row?, tz)?);
    }
    Ok(items)
}

// Internal row type for AgendaItem mapping
struct ItemRow {
    id: i64,
    therapy_id: i64,
    title: String,
    description: Option<String>,
    frequency: String,
    interval_value: i64,
    weekday: Option<i64>,
    first_due_at: String,
    next_due_at: Option<String>,
    status: String,
    therapy_title: String,
    patient_id: Option<i64>,
    patient_first_name: Option<String>,
    patient_last_name: Option<String>,
}

fn item_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<ItemRow, rusqlite::Error> {
    Ok(ItemRow {
        id: row.get(0)?,
        therapy_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        frequency: row.get(4)?,
        interval_value: row.get(5)?,
        weekday: row.get(6)?,
        first_due_at: row.get(7)?,
        next_due_at: row.get(8)?,
        status: row.get(9)?,
        therapy_title: row.get(10)?,
        patient_id: row.get(11)?,
        patient_first_name: row.get(12)?,
        patient_last_name: row.get(13)?,
    })
}

fn item_from_row(row: ItemRow, tz: Tz) -> Result<AgendaItem, DatabaseError> {
    let interval_value = u32::try_from(row.interval_value)
        .ok()
        .filter(|v| *v >= 1)
        .ok_or_else(|| DatabaseError::ConstraintViolation(format!(
            "reminder {} has interval_value {}",
            row.id, row.interval_value
        )))?;
    let weekday = row
        .weekday
        .map(|d| {
            u8::try_from(d).map_err(|_| {
                DatabaseError::ConstraintViolation(format!("reminder {} has weekday {d}", row.id))
            })
        })
        .transpose()?;

    Ok(AgendaItem {
        reminder: Reminder {
            id: row.id,
            therapy_id: row.therapy_id,
            title: row.title,
            description: row.description,
            frequency: Frequency::from_str(&row.frequency)?,
            interval_value,
            weekday,
            first_due_at: parse_db_timestamp("first_due_at", &row.first_due_at, tz)?,
            next_due_at: row
                .next_due_at
                .map(|raw| parse_db_timestamp("next_due_at", &raw, tz))
                .transpose()?,
            status: ReminderStatus::from_str(&row.status)?,
        },
        therapy_title: row.therapy_title,
        patient_id: row.patient_id,
        patient_first_name: row.patient_first_name,
        patient_last_name: row.patient_last_name,
    })
}
