pub mod config;
pub mod models;
pub mod db;
pub mod reminders; // Therapy reminders: scheduling, agenda, lifecycle

use tracing_subscriber::EnvFilter;

pub use config::SchedulerConfig;
pub use reminders::{Agenda, ReminderError};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over [`config::default_log_filter`]. Calling this more than
/// once is harmless; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}
