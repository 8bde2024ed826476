//! Batch persistence of loosely-typed records into typed entities.
//!
//! Records coming out of an ETL pipeline are preprocessed by a chain of
//! [`convert`] stages (defaults, computed fields, foreign-key resolution) and
//! then handed to an [`EntityWriter`], which finds or creates the matching
//! entity, applies the record's fields through the entity's setter table and
//! stages it with a [`Backend`], committing in batches.
//!
//! ```rust,ignore
//! use std::{cell::RefCell, rc::Rc};
//! use entity_writer::{Entity, EntityWriter, MemoryBackend, Record, WriterConfig};
//!
//! #[derive(Debug, Clone, Default, Entity)]
//! struct Customer {
//!     id: Option<i64>,
//!     email: String,
//!     status: String,
//! }
//!
//! let backend = Rc::new(RefCell::new(MemoryBackend::new()));
//! let mut writer = EntityWriter::<Customer, _>::new(backend, &["email"], "exact")?
//!     .with_config(WriterConfig::default().with_truncate(false))?;
//! writer.prepare()?;
//! writer.write_item(Record::new().with("email", "a@x.com"))?;
//! writer.finish()?;
//! ```

// Lets the derive macro refer to this crate by name from inside it
extern crate self as entity_writer;

pub mod backend;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod utils;
pub mod value;
pub mod writer;

// Re-export the most common types for easier use
// Core types
pub use config::{DateFormatConfig, EmptyValuePolicy, WriterConfig};
pub use error::{Error, Result};
pub use value::{EntityRef, Identity, Record, Value};
pub use writer::{EntityWriter, WriteStats, WriterState};

// Entities
pub use macros::Entity;
pub use model::{Entity, EntityMetadata, FieldDef, FieldKind, ScalarType};

// Backends
pub use backend::{Backend, LookupStrategy, Managed, MemoryBackend, SqliteBackend};

// Pipeline stages
pub use convert::{DefaultValues, FormatField, Pipeline, RecordStage, ReferenceResolver};
