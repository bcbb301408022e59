//! Reminder state machine: `active`, `done`, `cancelled`.
//!
//! Planning is pure. The service layer persists the planned transition
//! inside one transaction, or nothing at all when planning fails.

use chrono::DateTime;
use chrono_tz::Tz;

use crate::models::{Reminder, ReminderStatus};

use super::error::ReminderError;
use super::schedule::compute_next_due;

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// One-shot reminder completed; terminal.
    Completed,
    /// Recurring reminder advanced by one period; stays active.
    Rescheduled { next_due_at: DateTime<Tz> },
    /// Soft-cancelled; terminal.
    Cancelled,
    /// No transition leaves `done` or `cancelled`.
    Unchanged { status: ReminderStatus },
}

impl Transition {
    pub fn resulting_status(&self) -> ReminderStatus {
        match self {
            Transition::Completed => ReminderStatus::Done,
            Transition::Rescheduled { .. } => ReminderStatus::Active,
            Transition::Cancelled => ReminderStatus::Cancelled,
            Transition::Unchanged { status } => *status,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Transition::Unchanged { .. })
    }

    /// Apply to an in-memory reminder.
    pub fn apply(&self, reminder: &mut Reminder) {
        if let Transition::Rescheduled { next_due_at } = self {
            reminder.next_due_at = Some(*next_due_at);
        }
        reminder.status = self.resulting_status();
    }
}

/// Plan the "mark done" action.
///
/// Recurring reminders advance from their stored `next_due_at` (falling
/// back to `first_due_at`), not from the current time: one completion
/// moves the schedule by exactly one period.
pub fn plan_mark_done(reminder: &Reminder) -> Result<Transition, ReminderError> {
    if reminder.status.is_terminal() {
        return Ok(Transition::Unchanged {
            status: reminder.status,
        });
    }

    if !reminder.frequency.is_recurring() {
        return Ok(Transition::Completed);
    }

    let next_due_at = compute_next_due(
        reminder.frequency,
        i64::from(reminder.interval_value),
        reminder.schedule_base(),
    )
    .ok_or(ReminderError::SchedulingError {
        reminder_id: reminder.id,
    })?;

    Ok(Transition::Rescheduled { next_due_at })
}

/// Plan a cancel (or soft delete).
pub fn plan_cancel(reminder: &Reminder) -> Transition {
    if reminder.status.is_terminal() {
        Transition::Unchanged {
            status: reminder.status,
        }
    } else {
        Transition::Cancelled
    }
}
