//! Free-form frequency labels → canonical `Frequency`.

use std::str::FromStr;

use crate::models::Frequency;

use super::error::ReminderError;

/// Synonyms accepted on input, after trimming and lower-casing.
const FREQUENCY_SYNONYMS: &[(&str, &str)] = &[
    ("one-shot", "one_shot"),
    ("one shot", "one_shot"),
    ("once", "one_shot"),
    ("bi-weekly", "biweekly"),
    ("bi weekly", "biweekly"),
];

/// Trim, lower-case and map known synonyms to their canonical label.
///
/// Unrecognized values come back lower-cased but otherwise untouched so
/// that validation can reject them with the caller's original wording.
pub fn normalize_frequency(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    FREQUENCY_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == lowered)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or(lowered)
}

/// Normalize then parse into a canonical `Frequency`.
pub fn parse_frequency(raw: &str) -> Result<Frequency, ReminderError> {
    let normalized = normalize_frequency(raw);
    Frequency::from_str(&normalized).map_err(|_| ReminderError::InvalidFrequency(normalized))
}
