//! The pending-write set shared by the backend adapters.
//!
//! Staged entities are kept as rows. Staging the same managed entity twice
//! replaces its row, and lookups consult the pending rows before the store, so a
//! key repeated within one batch updates the staged entity in place.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::backend::{EntityState, Managed};
use crate::error::{Error, Result};
use crate::model::{Entity, Row, ScalarType};
use crate::value::{Identity, Value};

/// What committing a pending row does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOp {
    Insert,
    /// Overwrite the stored entity with this identity
    Update(Identity),
}

/// One staged write
#[derive(Debug, Clone)]
pub struct PendingRow {
    /// Entity type name
    pub entity: &'static str,
    /// Table of the entity type
    pub table: &'static str,
    /// Identifier field of the entity type
    pub identifier: &'static str,
    /// Identifier type. Null integer identifiers are reserved when staged.
    pub id_type: ScalarType,
    pub op: PendingOp,
    pub row: Row,
}

/// Staged, not yet committed writes
#[derive(Debug, Default)]
pub struct UnitOfWork {
    rows: Vec<PendingRow>,
    /// Slot of the pending update for each stored identity
    updates: FxHashMap<(&'static str, Identity), usize>,
    /// Successful commits that carried rows of each entity type
    commits: FxHashMap<&'static str, usize>,
}

impl UnitOfWork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Stage an entity, returning its slot
    pub fn stage<E: Entity>(&mut self, managed: Managed<E>) -> Result<usize> {
        let metadata = E::metadata();
        let (entity, state) = managed.into_parts();
        let row = metadata.to_row(&entity);

        match state {
            EntityState::Pending { slot, .. } => {
                let pending = self
                    .rows
                    .get_mut(slot)
                    .filter(|pending| pending.entity == E::NAME)
                    .ok_or_else(|| {
                        Error::invalid_state("persist", format!("holding stale pending slot {slot}"))
                    })?;
                pending.row = row;
                Ok(slot)
            }
            EntityState::Persisted(id) => {
                let key = (E::NAME, id);
                if let Some(&slot) = self.updates.get(&key) {
                    self.rows[slot].row = row;
                    return Ok(slot);
                }
                let slot = self.push::<E>(PendingOp::Update(key.1.clone()), row);
                self.updates.insert(key, slot);
                Ok(slot)
            }
            EntityState::New => Ok(self.push::<E>(PendingOp::Insert, row)),
        }
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&PendingRow> {
        self.rows.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut PendingRow> {
        self.rows.get_mut(slot)
    }

    /// First staged entity of type `E` whose row satisfies `matches`
    pub fn find<E: Entity>(&self, matches: impl Fn(&Row) -> bool) -> Result<Option<Managed<E>>> {
        let found = self
            .rows
            .iter()
            .enumerate()
            .find(|(_, pending)| pending.entity == E::NAME && matches(&pending.row));
        found
            .map(|(slot, pending)| self.hydrate::<E>(slot, pending))
            .transpose()
    }

    /// Staged entity of type `E` bound to the given identity
    pub fn find_by_identity<E: Entity>(&self, id: &Identity) -> Result<Option<Managed<E>>> {
        if let Some(&slot) = self.updates.get(&(E::NAME, id.clone())) {
            return self.hydrate::<E>(slot, &self.rows[slot]).map(Some);
        }
        let wanted = id.to_value();
        self.find::<E>(|row| {
            E::metadata()
                .row_value(row, E::IDENTIFIER)
                .is_some_and(|stored| *stored == wanted)
        })
    }

    /// Whether a stored entity has a staged update that supersedes it
    #[must_use]
    pub fn is_shadowed(&self, entity: &'static str, id: &Identity) -> bool {
        self.updates.contains_key(&(entity, id.clone()))
    }

    /// Drain every staged row for commit
    pub fn take(&mut self) -> Vec<PendingRow> {
        self.updates.clear();
        std::mem::take(&mut self.rows)
    }

    /// Count a successful commit once for every entity type it carried
    pub fn record_commit(&mut self, committed: impl IntoIterator<Item = &'static str>) {
        let entities: FxHashSet<&'static str> = committed.into_iter().collect();
        for entity in entities {
            *self.commits.entry(entity).or_default() += 1;
        }
    }

    /// Successful commits that carried rows of `entity`
    #[must_use]
    pub fn commits(&self, entity: &str) -> usize {
        self.commits.get(entity).copied().unwrap_or(0)
    }

    /// Drop staged rows of one entity type. Slots held by callers become stale.
    pub fn discard(&mut self, entity: &'static str) -> usize {
        let before = self.rows.len();
        self.rows.retain(|pending| pending.entity != entity);
        self.updates = self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(slot, pending)| match &pending.op {
                PendingOp::Update(id) => Some(((pending.entity, id.clone()), slot)),
                PendingOp::Insert => None,
            })
            .collect();
        before - self.rows.len()
    }

    fn push<E: Entity>(&mut self, op: PendingOp, row: Row) -> usize {
        self.rows.push(PendingRow {
            entity: E::NAME,
            table: E::TABLE,
            identifier: E::IDENTIFIER,
            id_type: E::ID_TYPE,
            op,
            row,
        });
        self.rows.len() - 1
    }

    fn hydrate<E: Entity>(&self, slot: usize, pending: &PendingRow) -> Result<Managed<E>> {
        let metadata = E::metadata();
        let identity = match &pending.op {
            PendingOp::Update(id) => Some(id.clone()),
            PendingOp::Insert => metadata
                .row_value(&pending.row, E::IDENTIFIER)
                .and_then(Identity::from_value),
        };
        let entity = metadata.from_row(&pending.row)?;
        Ok(Managed::with_state(
            entity,
            EntityState::Pending { slot, identity },
        ))
    }
}

impl PendingRow {
    /// Whether the row is an insert still waiting for an integer identity
    #[must_use]
    pub fn needs_identity(&self) -> bool {
        self.op == PendingOp::Insert
            && self.id_type == ScalarType::Int
            && self.identifier_value().and_then(Identity::from_value).is_none()
    }

    /// Identifier value held by the row
    #[must_use]
    pub fn identifier_value(&self) -> Option<&Value> {
        self.row
            .iter()
            .find(|(name, _)| *name == self.identifier)
            .map(|(_, value)| value)
    }

    /// Set the identifier value, e.g. after the store assigned one
    pub fn set_identifier(&mut self, id: &Identity) {
        if let Some((_, value)) = self.row.iter_mut().find(|(name, _)| *name == self.identifier) {
            *value = id.to_value();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Entity;

    #[derive(Debug, Clone, Default, PartialEq, Entity)]
    struct Note {
        id: Option<i64>,
        body: String,
    }

    #[derive(Debug, Clone, Default, PartialEq, Entity)]
    struct Label {
        #[entity(id)]
        key: String,
    }

    #[test]
    fn test_restaging_replaces_slot() {
        let mut uow = UnitOfWork::new();
        let slot = uow.stage(Managed::new(Note::default())).unwrap();
        assert!(uow.get(slot).unwrap().needs_identity());

        let mut staged = uow.find::<Note>(|_| true).unwrap().unwrap();
        staged.entity_mut().body = "edited".to_string();
        assert_eq!(uow.stage(staged).unwrap(), slot);
        assert_eq!(uow.len(), 1);
    }

    #[test]
    fn test_commits_count_once_per_entity_type() {
        let mut uow = UnitOfWork::new();
        uow.stage(Managed::new(Note::default())).unwrap();
        uow.stage(Managed::new(Note::default())).unwrap();
        uow.stage(Managed::new(Label {
            key: "k".to_string(),
        }))
        .unwrap();
        assert!(!uow.get(2).unwrap().needs_identity());

        let committed = uow.take();
        uow.record_commit(committed.iter().map(|row| row.entity));
        assert_eq!(uow.commits("Note"), 1);
        assert_eq!(uow.commits("Label"), 1);
        assert_eq!(uow.commits("Other"), 0);
    }
}
