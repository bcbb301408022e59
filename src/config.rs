use std::path::PathBuf;

use chrono_tz::Tz;
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Pharmacare";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Zone every reminder timestamp is interpreted in unless overridden.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Rome;

/// Environment variable overriding the scheduler timezone (IANA name).
pub const TIMEZONE_ENV: &str = "PHARMACARE_TIMEZONE";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PHARMACARE_DATA_DIR";

const DATABASE_FILE: &str = "pharmacare.db";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Cannot determine data directory")]
    NoDataDir,
}

/// Default `tracing` filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "pharmacare=info"
}

/// Get the application data directory.
/// `$PHARMACARE_DATA_DIR` when set, otherwise `<platform data dir>/Pharmacare`.
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    data_dir_from(std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
}

/// Get the SQLite database path inside the data directory.
pub fn database_path() -> Result<PathBuf, ConfigError> {
    database_path_from(std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
}

fn data_dir_from(override_dir: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    match override_dir {
        Some(dir) => Ok(dir),
        None => dirs::data_dir()
            .map(|dir| dir.join(APP_NAME))
            .ok_or(ConfigError::NoDataDir),
    }
}

fn database_path_from(override_dir: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    Ok(data_dir_from(override_dir)?.join(DATABASE_FILE))
}

/// Scheduler settings threaded explicitly through every date computation.
///
/// The timezone is never taken from the process environment implicitly:
/// callers build a `SchedulerConfig` once (usually via [`SchedulerConfig::from_env`])
/// and pass it down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub timezone: Tz,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE,
        }
    }
}

impl SchedulerConfig {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Build from an IANA zone name such as `Europe/Rome`.
    pub fn from_timezone_name(name: &str) -> Result<Self, ConfigError> {
        let trimmed = name.trim();
        let timezone = trimmed
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(trimmed.to_string()))?;
        Ok(Self::new(timezone))
    }

    /// Read `PHARMACARE_TIMEZONE`, falling back to `Europe/Rome`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(TIMEZONE_ENV) {
            Some(name) if !name.trim().is_empty() => Self::from_timezone_name(&name),
            _ => Ok(Self::default()),
        }
    }
}
