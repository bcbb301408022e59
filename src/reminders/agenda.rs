//! Three-way agenda split of active reminders around "now".

use chrono::{DateTime, TimeDelta};
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::{AgendaItem, Reminder, ReminderStatus};

use super::schedule::resolve_local;

/// Anything the agenda can place on the timeline.
pub trait AgendaEntry {
    fn status(&self) -> ReminderStatus;
    fn due_at(&self) -> Option<DateTime<Tz>>;
}

impl AgendaEntry for Reminder {
    fn status(&self) -> ReminderStatus {
        self.status
    }

    fn due_at(&self) -> Option<DateTime<Tz>> {
        self.next_due_at
    }
}

impl AgendaEntry for AgendaItem {
    fn status(&self) -> ReminderStatus {
        self.reminder.status
    }

    fn due_at(&self) -> Option<DateTime<Tz>> {
        self.reminder.next_due_at
    }
}

/// Disjoint groups, each sorted by due time ascending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Agenda<T> {
    pub overdue: Vec<T>,
    pub today: Vec<T>,
    pub upcoming: Vec<T>,
}

impl<T> Default for Agenda<T> {
    fn default() -> Self {
        Self {
            overdue: Vec::new(),
            today: Vec::new(),
            upcoming: Vec::new(),
        }
    }
}

impl<T> Agenda<T> {
    pub fn len(&self) -> usize {
        self.overdue.len() + self.today.len() + self.upcoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Local midnight at the start of the day after `now`, in `now`'s zone.
pub fn start_of_tomorrow(now: DateTime<Tz>) -> DateTime<Tz> {
    now.date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| resolve_local(now.timezone(), midnight))
        .unwrap_or_else(|| now + TimeDelta::days(1))
}

/// Split active entries into overdue / today / upcoming.
///
/// - overdue: `due < now`
/// - today: `now <= due < start_of_tomorrow`
/// - upcoming: `due >= start_of_tomorrow`
///
/// `done` and `cancelled` entries, and entries without a due time, are
/// left out. Entries with equal due times keep their input order.
pub fn partition_agenda<T, I>(now: DateTime<Tz>, entries: I) -> Agenda<T>
where
    T: AgendaEntry,
    I: IntoIterator<Item = T>,
{
    let tomorrow = start_of_tomorrow(now);

    let mut active: Vec<(DateTime<Tz>, T)> = entries
        .into_iter()
        .filter(|entry| entry.status() == ReminderStatus::Active)
        .filter_map(|entry| entry.due_at().map(|due| (due, entry)))
        .collect();
    active.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut agenda = Agenda::default();
    for (due, entry) in active {
        if due < now {
            agenda.overdue.push(entry);
        } else if due < tomorrow {
            agenda.today.push(entry);
        } else {
            agenda.upcoming.push(entry);
        }
    }
    agenda
}
