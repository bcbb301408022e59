use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;

use super::enums::{Frequency, ReminderStatus};

/// One scheduled notification tied to a therapy.
///
/// `first_due_at` is the immutable anchor; `next_due_at` moves forward one
/// period per completion of a recurring reminder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reminder {
    pub id: i64,
    pub therapy_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub frequency: Frequency,
    pub interval_value: u32,
    /// ISO weekday (Monday = 1). Set iff `frequency` is weekly.
    pub weekday: Option<u8>,
    pub first_due_at: DateTime<Tz>,
    pub next_due_at: Option<DateTime<Tz>>,
    pub status: ReminderStatus,
}

impl Reminder {
    /// Timestamp the next occurrence is computed from.
    pub fn schedule_base(&self) -> Option<DateTime<Tz>> {
        self.next_due_at.or(Some(self.first_due_at))
    }
}

/// Validated fields for a reminder insert or full update.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReminder {
    pub therapy_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub frequency: Frequency,
    pub interval_value: u32,
    pub weekday: Option<u8>,
    pub first_due_at: DateTime<Tz>,
}

/// Reminder joined with its therapy and patient, as shown in the agenda.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgendaItem {
    #[serde(flatten)]
    pub reminder: Reminder,
    pub therapy_title: String,
    pub patient_id: Option<i64>,
    pub patient_first_name: Option<String>,
    pub patient_last_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AgendaFilter {
    pub therapy_id: Option<i64>,
    pub patient_id: Option<i64>,
}
