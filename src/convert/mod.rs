//! Record preprocessing stages run before a record reaches the writer.
//!
//! Each stage takes a record by value and hands back the (possibly modified)
//! record. A [`Pipeline`] chains stages in the order they were added.

pub mod defaults;
pub mod format;
pub mod reference;

pub use defaults::{DefaultValues, merge_defaults};
pub use format::{FormatField, Template};
pub use reference::ReferenceResolver;

use std::fmt;

use crate::error::Result;
use crate::value::Record;

/// A single record transformation
pub trait RecordStage {
    /// Short name used in logs
    fn name(&self) -> &str {
        "custom"
    }

    fn apply(&self, record: Record) -> Result<Record>;
}

impl<F> RecordStage for F
where
    F: Fn(Record) -> Result<Record>,
{
    fn apply(&self, record: Record) -> Result<Record> {
        self(record)
    }
}

/// Ordered chain of stages
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn RecordStage>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|stage| stage.name()))
            .finish()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage
    #[must_use]
    pub fn stage(mut self, stage: impl RecordStage + 'static) -> Self {
        self.push(stage);
        self
    }

    pub fn push(&mut self, stage: impl RecordStage + 'static) {
        self.stages.push(Box::new(stage));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run a record through every stage in order
    pub fn process(&self, record: Record) -> Result<Record> {
        self.stages.iter().try_fold(record, |record, stage| {
            log::trace!("Applying {} stage", stage.name());
            stage.apply(record)
        })
    }

    /// Decode a JSON object into a record and run it through the pipeline.
    ///
    /// Fails with `InvalidInput` when the input is not a flat object.
    pub fn process_json(&self, json: serde_json::Value) -> Result<Record> {
        self.process(Record::from_json(json)?)
    }
}
