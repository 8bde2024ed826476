//! Run lifecycle and counters of an `EntityWriter`.

use std::fmt;

/// Lifecycle of a writer run: `Idle -> Prepared -> Writing -> Finished`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterState {
    /// Constructed, no side effects yet
    #[default]
    Idle,
    /// Diagnostics suppressed, table truncated if configured
    Prepared,
    /// At least one record processed
    Writing,
    /// Final flush done, diagnostics restored. Terminal.
    Finished,
}

impl WriterState {
    /// Whether records may be written in this state
    #[must_use]
    pub const fn accepts_writes(self) -> bool {
        matches!(self, Self::Prepared | Self::Writing)
    }
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Prepared => "prepared",
            Self::Writing => "writing",
            Self::Finished => "finished",
        })
    }
}

/// Counters of a writer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Records written
    pub written: usize,
    /// Records that produced a new entity
    pub inserted: usize,
    /// Records that updated a stored or already staged entity
    pub updated: usize,
    /// Backend commits since `prepare` that carried rows of the entity type,
    /// whichever writer triggered them
    pub flushes: usize,
}
