//! Logging utilities for writer runs
//!
//! This module provides logger initialisation and standardized messages for
//! the start and end of a run.

pub mod log;

// Re-export commonly used functions for convenience
pub use self::log::{init_logging, log_run_complete, log_run_start, log_warning};
