//! Foreign-key resolution by repository lookup.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::backend::{Backend, Conditions, LookupStrategy};
use crate::config::DateFormatConfig;
use crate::convert::RecordStage;
use crate::error::{Error, Result};
use crate::model::Entity;
use crate::value::{Record, Value};

/// Looks up an entity of type `E` by key fields of a record and writes a
/// reference to it (or null) into an output field.
///
/// A missing or empty key field, a key that cannot be coerced to the field
/// type, or no matching entity all resolve to null. Staged entities match too:
/// backends reserve integer identities when an entity is staged. The output
/// field is always overwritten, so a value left by an earlier stage or record
/// never survives.
pub struct ReferenceResolver<E: Entity, B: Backend> {
    backend: Rc<RefCell<B>>,
    lookup_fields: Vec<&'static str>,
    output: String,
    strategy: LookupStrategy,
    formats: DateFormatConfig,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, B: Backend> fmt::Debug for ReferenceResolver<E, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceResolver")
            .field("entity", &E::NAME)
            .field("lookup_fields", &self.lookup_fields)
            .field("output", &self.output)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl<E: Entity, B: Backend> ReferenceResolver<E, B> {
    /// Bind a resolver to a backend.
    ///
    /// Fails with `UnsupportedBackend` when the backend cannot run the
    /// strategy, and with `InvalidConfig` when a lookup field is not a field of
    /// `E` or the output field is empty.
    pub fn new(
        backend: Rc<RefCell<B>>,
        lookup_fields: &[&str],
        output: impl Into<String>,
        strategy: LookupStrategy,
    ) -> Result<Self> {
        {
            let inner = backend.borrow();
            if !inner.supports_lookup(&strategy) {
                return Err(Error::UnsupportedBackend(format!(
                    "{} backend has no lookup strategy '{strategy}' for {}",
                    inner.name(),
                    E::NAME
                )));
            }
        }
        let output = output.into();
        if output.is_empty() {
            return Err(Error::InvalidConfig(
                "reference output field must not be empty".to_string(),
            ));
        }
        let lookup_fields = lookup_fields
            .iter()
            .map(|field| {
                E::metadata()
                    .field(field)
                    .map(|def| def.name)
                    .ok_or_else(|| {
                        Error::InvalidConfig(format!("{} has no lookup field '{field}'", E::NAME))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            backend,
            lookup_fields,
            output,
            strategy,
            formats: DateFormatConfig::default(),
            _entity: PhantomData,
        })
    }

    /// Use custom date formats when coercing date key fields
    #[must_use]
    pub fn with_date_formats(mut self, formats: DateFormatConfig) -> Self {
        self.formats = formats;
        self
    }

    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Resolve the record's key fields to a reference, or `Value::Null`.
    ///
    /// Fails with `Constraint` when the matching entity has no identity, which
    /// only happens for a staged entity whose text identifier is unset.
    pub fn resolve(&self, record: &Record) -> Result<Value> {
        let Some(conditions) = self.conditions(record) else {
            return Ok(Value::Null);
        };
        let mut backend = self.backend.borrow_mut();
        let Some(found) = backend.find_one_by::<E>(&self.strategy, &conditions)? else {
            log::debug!("No {} matches {:?}", E::NAME, conditions);
            return Ok(Value::Null);
        };
        let id = found.identity().ok_or_else(|| {
            Error::Constraint(format!(
                "matching {} has no value for identifier '{}'",
                E::NAME,
                E::IDENTIFIER
            ))
        })?;
        Ok(Value::Ref(backend.reference(E::NAME, id)))
    }

    fn conditions(&self, record: &Record) -> Option<Conditions> {
        if self.lookup_fields.is_empty() {
            return None;
        }
        let metadata = E::metadata();
        let mut conditions = Conditions::new();
        for &field in &self.lookup_fields {
            let value = record.get(field).filter(|value| !value.is_empty())?;
            let def = metadata.field(field)?;
            match def.storage_type().coerce(field, value.clone(), &self.formats) {
                Ok(coerced) => conditions.push((field, coerced)),
                Err(err) => {
                    log::debug!("Lookup key for {} not usable: {err}", E::NAME);
                    return None;
                }
            }
        }
        Some(conditions)
    }
}

impl<E: Entity, B: Backend> RecordStage for ReferenceResolver<E, B> {
    fn name(&self) -> &str {
        "reference"
    }

    fn apply(&self, mut record: Record) -> Result<Record> {
        let resolved = self.resolve(&record)?;
        record.insert(self.output.as_str(), resolved);
        Ok(record)
    }
}
