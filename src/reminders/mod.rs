//! Therapy reminders.
//!
//! Pure scheduling logic lives in [`frequency`], [`schedule`], [`agenda`] and
//! [`lifecycle`]; [`service`] runs it against the database for one pharmacy.

pub mod agenda;
pub mod error;
pub mod frequency;
pub mod lifecycle;
pub mod schedule;
pub mod service;

pub use agenda::{partition_agenda, start_of_tomorrow, Agenda, AgendaEntry};
pub use error::{ErrorBody, ErrorDetail, ReminderError};
pub use frequency::{normalize_frequency, parse_frequency};
pub use lifecycle::{plan_cancel, plan_mark_done, Transition};
pub use schedule::{add_months_keep_day, compute_next_due, parse_due_datetime, resolve_local};
pub use service::{
    agenda, cancel_reminder, create_reminder, delete_reminder, get_reminder, mark_done,
    update_reminder, validate_input, ReminderInput,
};
