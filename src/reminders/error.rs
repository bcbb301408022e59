//! Reminder error kinds with machine codes for the calling handler.

use serde::Serialize;
use thiserror::Error;

use crate::db::DatabaseError;

/// Structured error body a handler can serialize as-is.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum ReminderError {
    #[error("Invalid reminder frequency: {0}")]
    InvalidFrequency(String),

    #[error("Invalid date/time format: {0}")]
    InvalidDateTime(String),

    #[error("Cannot compute next due date for reminder {reminder_id}")]
    SchedulingError { reminder_id: i64 },

    #[error("Invalid weekday: {0} (expected 1-7)")]
    InvalidWeekday(i64),

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Reminder {reminder_id} not found")]
    NotFound { reminder_id: i64 },

    #[error("Therapy {therapy_id} not found for this pharmacy")]
    TherapyNotFound { therapy_id: i64 },

    #[error("Reminder {reminder_id} was modified concurrently")]
    ConcurrentModification { reminder_id: i64 },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for ReminderError {
    fn from(err: rusqlite::Error) -> Self {
        ReminderError::Database(DatabaseError::Sqlite(err))
    }
}

impl ReminderError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ReminderError::InvalidFrequency(_) => "REMINDER_INVALID_FREQUENCY",
            ReminderError::InvalidDateTime(_) => "REMINDER_INVALID_DATETIME",
            ReminderError::SchedulingError { .. } => "REMINDER_SCHEDULING_FAILED",
            ReminderError::InvalidWeekday(_) => "REMINDER_INVALID_WEEKDAY",
            ReminderError::MissingFields(_) => "REMINDER_MISSING_FIELDS",
            ReminderError::NotFound { .. } => "REMINDER_NOT_FOUND",
            ReminderError::TherapyNotFound { .. } => "THERAPY_NOT_FOUND",
            ReminderError::ConcurrentModification { .. } => "REMINDER_CONFLICT",
            ReminderError::Database(_) => "INTERNAL",
        }
    }

    /// HTTP-equivalent status the surrounding handler should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ReminderError::MissingFields(_) | ReminderError::TherapyNotFound { .. } => 400,
            ReminderError::NotFound { .. } => 404,
            ReminderError::ConcurrentModification { .. } => 409,
            ReminderError::InvalidFrequency(_)
            | ReminderError::InvalidDateTime(_)
            | ReminderError::SchedulingError { .. }
            | ReminderError::InvalidWeekday(_) => 422,
            ReminderError::Database(_) => 500,
        }
    }

    /// Validation failures are fixable by resubmitting a corrected request.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            ReminderError::Database(detail) => {
                tracing::error!(%detail, "reminder storage error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };
        ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message,
            },
        }
    }
}
