//! The batch persistence engine.
//!
//! An [`EntityWriter`] turns records into entities of one type and stages them
//! with the backend, committing every time more than `flush_threshold` writes
//! have been staged since the last commit.
//!
//! ```text
//! record -> merge defaults -> find or create -> associations -> scalars
//!        -> persist -> (counter > threshold) ? flush + clear
//! ```

pub mod state;

pub use state::{WriteStats, WriterState};

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;
use std::time::Instant;

use crate::backend::{Backend, Conditions, DiagnosticsGuard, LookupStrategy, Managed};
use crate::config::{EmptyValuePolicy, WriterConfig};
use crate::convert::merge_defaults;
use crate::error::{Error, Result};
use crate::model::{Entity, FieldKind};
use crate::utils::logging::{log_run_complete, log_run_start, log_warning};
use crate::value::{Record, Value};

/// Writes records as entities of type `E` through backend `B`
pub struct EntityWriter<E: Entity, B: Backend> {
    backend: Rc<RefCell<B>>,
    lookup_fields: Vec<&'static str>,
    strategy: LookupStrategy,
    config: WriterConfig,
    state: WriterState,
    /// Writes staged since the last commit
    staged: usize,
    /// Backend commits of `E` counted before `prepare`
    commit_baseline: usize,
    stats: WriteStats,
    diagnostics: Option<DiagnosticsGuard<B>>,
    started: Option<Instant>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, B: Backend> EntityWriter<E, B> {
    /// Bind a writer for `E` to a backend.
    ///
    /// `lookup_fields` selects the fields used to find the entity a record
    /// updates. With no lookup fields the first record value is used as a raw
    /// identity. Fails with `UnsupportedBackend` when the backend cannot run
    /// `strategy` and with `InvalidConfig` when a lookup field is not a field
    /// of `E`.
    pub fn new(
        backend: Rc<RefCell<B>>,
        lookup_fields: &[&str],
        strategy: impl Into<LookupStrategy>,
    ) -> Result<Self> {
        let strategy = strategy.into();
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
        let metadata = E::metadata();
        let lookup_fields = lookup_fields
            .iter()
            .map(|field| {
                metadata.field(field).map(|def| def.name).ok_or_else(|| {
                    Error::InvalidConfig(format!("{} has no lookup field '{field}'", E::NAME))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            backend,
            lookup_fields,
            strategy,
            config: WriterConfig::default(),
            state: WriterState::Idle,
            staged: 0,
            commit_baseline: 0,
            stats: WriteStats::default(),
            diagnostics: None,
            started: None,
            _entity: PhantomData,
        })
    }

    /// Replace the configuration. Only valid before `prepare`.
    pub fn configure(&mut self, config: WriterConfig) -> Result<()> {
        if self.state != WriterState::Idle {
            return Err(Error::invalid_state("configure", self.state));
        }
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Builder form of [`EntityWriter::configure`]
    pub fn with_config(mut self, config: WriterConfig) -> Result<Self> {
        self.configure(config)?;
        Ok(self)
    }

    #[must_use]
    pub const fn config(&self) -> &WriterConfig {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> WriterState {
        self.state
    }

    #[must_use]
    pub const fn stats(&self) -> WriteStats {
        self.stats
    }

    #[must_use]
    pub const fn backend(&self) -> &Rc<RefCell<B>> {
        &self.backend
    }

    /// Start a run: suppress backend diagnostics and truncate the table if
    /// configured.
    ///
    /// Truncation takes effect immediately and cannot be rolled back.
    pub fn prepare(&mut self) -> Result<()> {
        if self.state != WriterState::Idle {
            return Err(Error::invalid_state("prepare", self.state));
        }
        let guard = DiagnosticsGuard::suppress(&self.backend);
        if self.config.truncate {
            self.backend.borrow_mut().truncate::<E>()?;
        }
        self.commit_baseline = self.backend.borrow().commits(E::NAME);
        self.diagnostics = Some(guard);
        self.state = WriterState::Prepared;
        self.started = Some(Instant::now());
        log_run_start(E::NAME, self.config.truncate);
        Ok(())
    }

    /// Convert one record into an entity and stage it
    pub fn write_item(&mut self, mut record: Record) -> Result<()> {
        if !self.state.accepts_writes() {
            return Err(Error::invalid_state("write", self.state));
        }
        self.state = WriterState::Writing;
        merge_defaults(&mut record, &self.config.default_fields);

        {
            let mut backend = self.backend.borrow_mut();
            let mut managed = if self.config.truncate {
                Managed::new(E::default())
            } else {
                self.find_existing(&mut backend, &record)?
                    .unwrap_or_else(|| Managed::new(E::default()))
            };
            let inserting = managed.is_new();

            self.apply_associations(&backend, managed.entity_mut(), &record)?;
            self.apply_scalars(managed.entity_mut(), &record, inserting)?;
            backend.persist(managed)?;

            self.stats.written += 1;
            if inserting {
                self.stats.inserted += 1;
            } else {
                self.stats.updated += 1;
            }
        }

        self.staged += 1;
        if self.staged > self.config.flush_threshold {
            self.commit()?;
        }
        Ok(())
    }

    /// Decode a JSON object into a record and write it
    pub fn write_json(&mut self, json: serde_json::Value) -> Result<()> {
        self.write_item(Record::from_json(json)?)
    }

    /// Commit staged writes and release the backend's tracking of `E`.
    ///
    /// A no-op commit when nothing is staged.
    pub fn flush(&mut self) -> Result<()> {
        if self.state == WriterState::Finished {
            return Err(Error::invalid_state("flush", self.state));
        }
        self.commit()
    }

    /// End the run: flush once more and restore diagnostics.
    ///
    /// On a failed flush the writer stays open and diagnostics stay suppressed
    /// until [`EntityWriter::restore_diagnostics`] is called or the writer is
    /// dropped.
    pub fn finish(&mut self) -> Result<()> {
        if !self.state.accepts_writes() {
            return Err(Error::invalid_state("finish", self.state));
        }
        self.commit()?;
        self.restore_diagnostics();
        self.state = WriterState::Finished;
        log_run_complete(
            E::NAME,
            self.stats.written,
            self.stats.flushes,
            self.started.map(|started| started.elapsed()),
        );
        Ok(())
    }

    /// Restore the diagnostics state captured by `prepare`
    pub fn restore_diagnostics(&mut self) {
        if let Some(guard) = self.diagnostics.take() {
            guard.restore();
        }
    }

    /// Flush the backend and count the commits that carried rows of `E`,
    /// including those made by other writers sharing the backend.
    fn commit(&mut self) -> Result<()> {
        let mut backend = self.backend.borrow_mut();
        let pending = backend.pending();
        backend.flush()?;
        backend.clear::<E>();
        self.staged = 0;
        if pending > 0 {
            log::debug!("Flushed {pending} pending writes for {}", E::NAME);
        }
        self.stats.flushes = backend
            .commits(E::NAME)
            .saturating_sub(self.commit_baseline);
        Ok(())
    }

    fn find_existing(&self, backend: &mut B, record: &Record) -> Result<Option<Managed<E>>> {
        let formats = &self.config.date_formats;

        if self.lookup_fields.is_empty() {
            let Some((field, value)) = record.first() else {
                return Ok(None);
            };
            return match E::ID_TYPE.identity(E::IDENTIFIER, value.clone(), formats) {
                Ok(Some(id)) => backend.find::<E>(&id),
                Ok(None) => Ok(None),
                Err(err) => {
                    log::debug!("First field '{field}' is not a {} identity: {err}", E::NAME);
                    Ok(None)
                }
            };
        }

        let metadata = E::metadata();
        let mut conditions = Conditions::new();
        for &field in &self.lookup_fields {
            let value = record.get(field).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "lookup field '{field}' is missing from the {} record",
                    E::NAME
                ))
            })?;
            let coerced = match metadata.field(field) {
                Some(def) => def.storage_type().coerce(field, value.clone(), formats)?,
                None => value.clone(),
            };
            conditions.push((field, coerced));
        }
        backend.find_one_by::<E>(&self.strategy, &conditions)
    }

    fn apply_associations(&self, backend: &B, entity: &mut E, record: &Record) -> Result<()> {
        let metadata = E::metadata();
        for def in metadata.associations() {
            let Some(value) = record.get(def.name) else {
                continue;
            };
            let FieldKind::Association { target, id_type } = def.kind else {
                continue;
            };
            let reference = match value {
                Value::Ref(existing) => Value::Ref(existing.clone()),
                empty if empty.is_empty() => {
                    if self.config.empty_values == EmptyValuePolicy::Skip {
                        continue;
                    }
                    Value::Null
                }
                other => match id_type.identity(def.name, other.clone(), &self.config.date_formats)? {
                    Some(id) => Value::Ref(backend.reference(target, id)),
                    None => Value::Null,
                },
            };
            metadata.apply(entity, def.name, reference)?;
        }
        Ok(())
    }

    fn apply_scalars(&self, entity: &mut E, record: &Record, inserting: bool) -> Result<()> {
        let metadata = E::metadata();
        for def in metadata.scalar_fields() {
            let Some(value) = record.get(def.name) else {
                continue;
            };
            if def.name == E::IDENTIFIER && !inserting {
                continue;
            }
            if value.is_empty() && self.config.empty_values == EmptyValuePolicy::Skip {
                continue;
            }
            let FieldKind::Scalar(ty) = def.kind else {
                continue;
            };
            let coerced = ty.coerce(def.name, value.clone(), &self.config.date_formats)?;
            if unchanged_temporal(&(def.get)(entity), &coerced) {
                continue;
            }
            metadata.apply(entity, def.name, coerced)?;
        }
        Ok(())
    }
}

/// Dates and timestamps are only set again when the value differs
fn unchanged_temporal(current: &Value, incoming: &Value) -> bool {
    current.is_temporal() && current == incoming
}

impl<E: Entity, B: Backend> Drop for EntityWriter<E, B> {
    fn drop(&mut self) {
        if self.state.accepts_writes() {
            let pending = self.backend.try_borrow().map_or(0, |backend| backend.pending());
            log_warning(&format!(
                "{} writer dropped before finish, {pending} pending writes were not committed",
                E::NAME
            ));
        }
    }
}
