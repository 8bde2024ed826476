//! In-process, document-style backend.
//!
//! Rows are kept per table in identity order. Integer identities are handed out
//! from a per-table counter when an entity is staged. Flushing applies the
//! pending-write set to a copy of the tables and swaps it in only when every
//! write succeeded, so a failed commit leaves the store untouched.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::backend::{
    Backend, Conditions, EntityState, LookupStrategy, Managed, PendingOp, UnitOfWork, row_matches,
    value_matches,
};
use crate::error::{Error, Result};
use crate::model::{Entity, Row, ScalarType};
use crate::value::{Identity, Value};

/// Comparison used by a custom lookup strategy: `(stored, wanted)`
pub type LookupMatcher = fn(&Value, &Value) -> bool;

#[derive(Debug, Clone)]
struct MemoryTable {
    rows: BTreeMap<Identity, Row>,
    next_id: i64,
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl MemoryTable {
    fn assign_id(&mut self) -> Identity {
        let id = self.next_id;
        self.next_id += 1;
        Identity::Int(id)
    }

    fn observe(&mut self, id: &Identity) {
        if let Identity::Int(i) = id {
            self.next_id = self.next_id.max(i.saturating_add(1));
        }
    }
}

/// Backend keeping every entity in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: FxHashMap<&'static str, MemoryTable>,
    uow: UnitOfWork,
    lookups: FxHashMap<String, LookupMatcher>,
    flushes: usize,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named lookup strategy
    pub fn register_lookup(&mut self, name: impl Into<String>, matcher: LookupMatcher) {
        self.lookups.insert(name.into(), matcher);
    }

    /// Builder form of [`MemoryBackend::register_lookup`]
    #[must_use]
    pub fn with_lookup(mut self, name: impl Into<String>, matcher: LookupMatcher) -> Self {
        self.register_lookup(name, matcher);
        self
    }

    /// Number of commits that wrote at least one row
    #[must_use]
    pub const fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Number of stored entities of type `E`
    #[must_use]
    pub fn count<E: Entity>(&self) -> usize {
        self.tables.get(E::TABLE).map_or(0, |table| table.rows.len())
    }

    /// Every stored entity of type `E`, in identity order
    pub fn all<E: Entity>(&self) -> Result<Vec<E>> {
        let Some(table) = self.tables.get(E::TABLE) else {
            return Ok(Vec::new());
        };
        table
            .rows
            .values()
            .map(|row| E::metadata().from_row(row))
            .collect()
    }

    /// Store an entity directly, bypassing the pending-write set.
    ///
    /// A null integer identifier is assigned. Replaces any stored entity with
    /// the same identity.
    pub fn insert<E: Entity>(&mut self, entity: &E) -> Result<Identity> {
        let metadata = E::metadata();
        let mut row = metadata.to_row(entity);
        let table = self.tables.entry(E::TABLE).or_default();
        let id = match metadata.identity_of(entity) {
            Some(id) => id,
            None if E::ID_TYPE == ScalarType::Int => {
                let id = table.assign_id();
                set_row_identifier(&mut row, E::IDENTIFIER, &id);
                id
            }
            None => {
                return Err(Error::Constraint(format!(
                    "{} has no value for identifier '{}'",
                    E::NAME,
                    E::IDENTIFIER
                )));
            }
        };
        table.observe(&id);
        table.rows.insert(id.clone(), row);
        Ok(id)
    }

    fn matcher<'a>(
        &self,
        strategy: &'a LookupStrategy,
    ) -> Result<Box<dyn Fn(&Value, &Value) -> bool + 'a>> {
        match strategy {
            LookupStrategy::Custom(name) => {
                let custom = *self.lookups.get(name).ok_or_else(|| {
                    Error::UnsupportedBackend(format!(
                        "{} backend has no lookup strategy '{name}'",
                        self.name()
                    ))
                })?;
                Ok(Box::new(custom))
            }
            _ => Ok(Box::new(move |stored: &Value, wanted: &Value| {
                value_matches(strategy, stored, wanted)
            })),
        }
    }
}

fn set_row_identifier(row: &mut Row, identifier: &str, id: &Identity) {
    if let Some((_, value)) = row.iter_mut().find(|(name, _)| *name == identifier) {
        *value = id.to_value();
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn supports_lookup(&self, strategy: &LookupStrategy) -> bool {
        match strategy {
            LookupStrategy::Exact | LookupStrategy::CaseInsensitive => true,
            LookupStrategy::Custom(name) => self.lookups.contains_key(name),
        }
    }

    fn find_one_by<E: Entity>(
        &mut self,
        strategy: &LookupStrategy,
        conditions: &Conditions,
    ) -> Result<Option<Managed<E>>> {
        let metadata = E::metadata();
        let matcher = self.matcher(strategy)?;

        if let Some(staged) = self
            .uow
            .find::<E>(|row| row_matches(metadata, row, conditions, &*matcher))?
        {
            return Ok(Some(staged));
        }

        let Some(table) = self.tables.get(E::TABLE) else {
            return Ok(None);
        };
        let found = table.rows.iter().find(|(id, row)| {
            !self.uow.is_shadowed(E::NAME, id) && row_matches(metadata, row, conditions, &*matcher)
        });
        found
            .map(|(id, row)| {
                let entity = metadata.from_row(row)?;
                Ok(Managed::with_state(entity, EntityState::Persisted(id.clone())))
            })
            .transpose()
    }

    fn find<E: Entity>(&mut self, id: &Identity) -> Result<Option<Managed<E>>> {
        if let Some(staged) = self.uow.find_by_identity::<E>(id)? {
            return Ok(Some(staged));
        }
        let Some(row) = self.tables.get(E::TABLE).and_then(|table| table.rows.get(id)) else {
            return Ok(None);
        };
        let entity = E::metadata().from_row(row)?;
        Ok(Some(Managed::with_state(
            entity,
            EntityState::Persisted(id.clone()),
        )))
    }

    fn persist<E: Entity>(&mut self, entity: Managed<E>) -> Result<()> {
        let slot = self.uow.stage(entity)?;
        let Some(staged) = self.uow.get_mut(slot) else {
            return Ok(());
        };
        if staged.op != PendingOp::Insert {
            return Ok(());
        }
        let table = self.tables.entry(staged.table).or_default();
        if staged.needs_identity() {
            staged.set_identifier(&table.assign_id());
        } else if let Some(id) = staged.identifier_value().and_then(Identity::from_value) {
            table.observe(&id);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.uow.is_empty() {
            return Ok(());
        }
        let pending = self.uow.take();
        let written = pending.len();
        let mut tables = self.tables.clone();

        let entities: Vec<&'static str> = pending.iter().map(|staged| staged.entity).collect();
        for mut staged in pending {
            let table = tables.entry(staged.table).or_default();
            match staged.op.clone() {
                PendingOp::Insert => {
                    let id = match staged.identifier_value().and_then(Identity::from_value) {
                        Some(id) => id,
                        None if staged.id_type == ScalarType::Int => {
                            let id = table.assign_id();
                            staged.set_identifier(&id);
                            id
                        }
                        None => {
                            return Err(Error::Constraint(format!(
                                "{} has no value for identifier '{}'",
                                staged.entity, staged.identifier
                            )));
                        }
                    };
                    if table.rows.contains_key(&id) {
                        return Err(Error::Constraint(format!(
                            "duplicate {} identity {id}",
                            staged.entity
                        )));
                    }
                    table.observe(&id);
                    table.rows.insert(id, staged.row);
                }
                PendingOp::Update(id) => {
                    if !table.rows.contains_key(&id) {
                        return Err(Error::Constraint(format!(
                            "no stored {} with identity {id}",
                            staged.entity
                        )));
                    }
                    staged.set_identifier(&id);
                    table.rows.insert(id, staged.row);
                }
            }
        }

        self.tables = tables;
        self.uow.record_commit(entities);
        self.flushes += 1;
        log::debug!("Memory backend committed {written} pending writes");
        Ok(())
    }

    fn clear<E: Entity>(&mut self) {
        let dropped = self.uow.discard(E::NAME);
        if dropped > 0 {
            log::debug!("Discarded {dropped} pending {} writes", E::NAME);
        }
    }

    /// Identities already handed out are not reused.
    fn truncate<E: Entity>(&mut self) -> Result<()> {
        if let Some(table) = self.tables.get_mut(E::TABLE) {
            let removed = std::mem::take(&mut table.rows).len();
            log::debug!("Truncated {} ({removed} rows)", E::TABLE);
        }
        Ok(())
    }

    fn pending(&self) -> usize {
        self.uow.len()
    }

    fn commits(&self, entity: &'static str) -> usize {
        self.uow.commits(entity)
    }
}
