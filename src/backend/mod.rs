//! Persistence backends.
//!
//! The writer depends on storage only through [`Backend`]: repository lookup,
//! lightweight references, a unit of work (persist / flush / clear), table
//! truncation and an optional diagnostics toggle. Each concrete store gets one
//! adapter implementing the trait.

pub mod diagnostics;
pub mod memory;
pub mod sqlite;
pub mod unit_of_work;

pub use diagnostics::DiagnosticsGuard;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
pub use unit_of_work::{PendingOp, PendingRow, UnitOfWork};

use smallvec::SmallVec;
use std::fmt;

use crate::error::Result;
use crate::model::{Entity, EntityMetadata, Row};
use crate::value::{EntityRef, Identity, Value};

/// Field-to-value conditions of a repository lookup, already coerced to the
/// field types
pub type Conditions = SmallVec<[(&'static str, Value); 4]>;

/// How lookup conditions are compared against stored values
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum LookupStrategy {
    /// Every condition must match exactly
    #[default]
    Exact,
    /// Text conditions match ignoring ASCII case
    CaseInsensitive,
    /// A backend-specific strategy registered under a name
    Custom(String),
}

impl LookupStrategy {
    /// Resolve a strategy by its configured name
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "exact" | "find_one_by" => Self::Exact,
            "case_insensitive" => Self::CaseInsensitive,
            other => Self::Custom(other.to_string()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Exact => "exact",
            Self::CaseInsensitive => "case_insensitive",
            Self::Custom(name) => name,
        }
    }
}

impl From<&str> for LookupStrategy {
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}

impl fmt::Display for LookupStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unit-of-work state of an entity handed out by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityState {
    /// Freshly instantiated, not staged
    New,
    /// Staged in the pending-write set
    Pending {
        /// Position in the pending-write set
        slot: usize,
        /// Identity the staged row is bound to, if any
        identity: Option<Identity>,
    },
    /// Loaded from the store
    Persisted(Identity),
}

/// An entity together with its unit-of-work state
#[derive(Debug, Clone)]
pub struct Managed<E> {
    entity: E,
    state: EntityState,
}

impl<E: Entity> Managed<E> {
    /// Wrap a new, unstaged entity
    #[must_use]
    pub const fn new(entity: E) -> Self {
        Self {
            entity,
            state: EntityState::New,
        }
    }

    #[must_use]
    pub const fn with_state(entity: E, state: EntityState) -> Self {
        Self { entity, state }
    }

    #[must_use]
    pub const fn entity(&self) -> &E {
        &self.entity
    }

    pub fn entity_mut(&mut self) -> &mut E {
        &mut self.entity
    }

    #[must_use]
    pub const fn state(&self) -> &EntityState {
        &self.state
    }

    #[must_use]
    pub const fn is_new(&self) -> bool {
        matches!(self.state, EntityState::New)
    }

    /// Identity of the entity: the stored one, or whatever its identifier holds
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        match &self.state {
            EntityState::Persisted(id) => Some(id.clone()),
            EntityState::Pending {
                identity: Some(id), ..
            } => Some(id.clone()),
            _ => E::metadata().identity_of(&self.entity),
        }
    }

    #[must_use]
    pub fn into_inner(self) -> E {
        self.entity
    }

    pub(crate) fn into_parts(self) -> (E, EntityState) {
        (self.entity, self.state)
    }
}

/// Capability interface every storage adapter implements
pub trait Backend {
    /// Adapter name for logs and error messages
    fn name(&self) -> &'static str;

    /// Whether the repository can run lookups with the given strategy
    fn supports_lookup(&self, strategy: &LookupStrategy) -> bool;

    /// Find at most one entity matching all conditions.
    ///
    /// Staged but uncommitted entities are considered before the store.
    fn find_one_by<E: Entity>(
        &mut self,
        strategy: &LookupStrategy,
        conditions: &Conditions,
    ) -> Result<Option<Managed<E>>>;

    /// Find an entity by raw identity
    fn find<E: Entity>(&mut self, id: &Identity) -> Result<Option<Managed<E>>>;

    /// Lightweight reference usable as an association value, without loading
    fn reference(&self, target: &'static str, id: Identity) -> EntityRef {
        EntityRef::new(target, id)
    }

    /// Stage an entity in the pending-write set.
    ///
    /// A new entity with a null integer identifier gets its identity reserved
    /// here, so it can be referenced before the commit.
    fn persist<E: Entity>(&mut self, entity: Managed<E>) -> Result<()>;

    /// Commit the pending-write set
    fn flush(&mut self) -> Result<()>;

    /// Release in-memory tracking for an entity type
    fn clear<E: Entity>(&mut self);

    /// Remove every stored instance of an entity type, immediately
    fn truncate<E: Entity>(&mut self) -> Result<()>;

    /// Number of staged, uncommitted writes
    fn pending(&self) -> usize;

    /// Successful commits that carried rows of the named entity type
    fn commits(&self, entity: &'static str) -> usize;

    /// Current diagnostic logging state, `None` when unsupported
    fn diagnostics(&self) -> Option<bool> {
        None
    }

    /// Toggle diagnostic logging. Ignored when unsupported.
    fn set_diagnostics(&mut self, _enabled: bool) {}
}

/// Compare a stored value against a lookup condition
#[must_use]
pub fn value_matches(strategy: &LookupStrategy, stored: &Value, wanted: &Value) -> bool {
    match (strategy, stored, wanted) {
        (LookupStrategy::CaseInsensitive, Value::Text(a), Value::Text(b)) => {
            a.eq_ignore_ascii_case(b)
        }
        (_, Value::Ref(a), Value::Ref(b)) => a.id == b.id,
        (_, Value::Ref(a), other) | (_, other, Value::Ref(a)) => {
            Identity::from_value(other).is_some_and(|id| id == a.id)
        }
        _ => stored == wanted,
    }
}

/// Whether a row satisfies every condition under the given comparison
pub fn row_matches<E>(
    metadata: &EntityMetadata<E>,
    row: &Row,
    conditions: &Conditions,
    matcher: &dyn Fn(&Value, &Value) -> bool,
) -> bool {
    conditions.iter().all(|(field, wanted)| {
        metadata
            .row_value(row, field)
            .is_some_and(|stored| matcher(stored, wanted))
    })
}
