//! Logging utilities
//!
//! This module provides standardized logging functions for writer runs.

use std::time::Duration;

/// Initialise `env_logger` with an `info` default filter.
///
/// `RUST_LOG` overrides the default. Calling this more than once is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// Log a run start with consistent format
///
/// # Arguments
/// * `entity` - Name of the entity type being written
/// * `truncate` - Whether the table was truncated before the run
pub fn log_run_start(entity: &str, truncate: bool) {
    if truncate {
        log::info!("Writing {entity} entities into a truncated table");
    } else {
        log::info!("Writing {entity} entities, updating existing matches");
    }
}

/// Log a run completion with consistent format
///
/// # Arguments
/// * `entity` - Name of the entity type that was written
/// * `items` - Number of records written
/// * `flushes` - Number of commits
/// * `elapsed` - Optional elapsed time
pub fn log_run_complete(entity: &str, items: usize, flushes: usize, elapsed: Option<Duration>) {
    if let Some(duration) = elapsed {
        log::info!(
            "Successfully wrote {items} {entity} records in {flushes} flushes in {duration:?}"
        );
    } else {
        log::info!("Successfully wrote {items} {entity} records in {flushes} flushes");
    }
}

/// Log a warning with consistent format
///
/// # Arguments
/// * `message` - Warning message
pub fn log_warning(message: &str) {
    log::warn!("{message}");
}
