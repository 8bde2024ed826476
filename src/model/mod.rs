//! Entity metadata and the setter tables built from it.
//!
//! Every entity type describes itself once through [`Entity::metadata`]: its
//! scalar fields, its associations and a getter plus optional setter per field.
//! The writer and the storage backends only ever touch entities through this
//! table, so unknown record keys are skipped by lookup rather than reflection.

pub mod field_value;
pub mod types;

pub use field_value::{FieldValue, Scalar, assign};
pub use types::ScalarType;

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::value::{EntityRef, Identity, Value};

/// Stored representation of an entity: field name to value, in metadata order
pub type Row = Vec<(&'static str, Value)>;

/// Reads a field value from an entity
pub type Getter<E> = fn(&E) -> Value;
/// Writes an already coerced value into an entity field
pub type Setter<E> = fn(&mut E, Value) -> Result<()>;

/// A domain type that can be persisted by the writer.
///
/// Usually implemented through `#[derive(Entity)]`.
pub trait Entity: Default + Clone + 'static {
    /// Entity type name, used in references
    const NAME: &'static str;
    /// Table or collection name
    const TABLE: &'static str;
    /// Name of the identifier field
    const IDENTIFIER: &'static str;
    /// Type of the identifier field
    const ID_TYPE: ScalarType;

    /// Field table for this type, built once
    fn metadata() -> &'static EntityMetadata<Self>;
}

/// Shape of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain column
    Scalar(ScalarType),
    /// Reference to another entity type
    Association {
        /// Name of the target entity type
        target: &'static str,
        /// Identifier type of the target
        id_type: ScalarType,
    },
}

/// One entry of the field table
pub struct FieldDef<E> {
    pub name: &'static str,
    pub kind: FieldKind,
    pub get: Getter<E>,
    /// `None` when the entity exposes no settable slot for the field
    pub set: Option<Setter<E>>,
}

impl<E> Clone for FieldDef<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for FieldDef<E> {}

impl<E> std::fmt::Debug for FieldDef<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("settable", &self.set.is_some())
            .finish()
    }
}

impl<E> FieldDef<E> {
    #[must_use]
    pub const fn scalar(
        name: &'static str,
        ty: ScalarType,
        get: Getter<E>,
        set: Option<Setter<E>>,
    ) -> Self {
        Self {
            name,
            kind: FieldKind::Scalar(ty),
            get,
            set,
        }
    }

    #[must_use]
    pub const fn association(
        name: &'static str,
        target: &'static str,
        id_type: ScalarType,
        get: Getter<E>,
        set: Option<Setter<E>>,
    ) -> Self {
        Self {
            name,
            kind: FieldKind::Association { target, id_type },
            get,
            set,
        }
    }

    #[must_use]
    pub const fn is_association(&self) -> bool {
        matches!(self.kind, FieldKind::Association { .. })
    }

    /// Column type used for storage; associations store the target identity
    #[must_use]
    pub const fn storage_type(&self) -> ScalarType {
        match self.kind {
            FieldKind::Scalar(ty) => ty,
            FieldKind::Association { id_type, .. } => id_type,
        }
    }

    /// Turn a stored column value back into the field's value shape
    #[must_use]
    pub fn hydrate(&self, stored: Value) -> Value {
        match self.kind {
            FieldKind::Association { target, .. } => Identity::from_value(&stored)
                .map_or(Value::Null, |id| Value::Ref(EntityRef::new(target, id))),
            FieldKind::Scalar(_) => stored,
        }
    }
}

/// Structural description of an entity type
#[derive(Debug)]
pub struct EntityMetadata<E> {
    name: &'static str,
    table: &'static str,
    identifier: &'static str,
    fields: Vec<FieldDef<E>>,
    index: FxHashMap<&'static str, usize>,
}

impl<E> EntityMetadata<E> {
    /// Build the field table.
    ///
    /// # Panics
    ///
    /// Panics if `identifier` does not name one of the fields. The derive macro
    /// guarantees this for generated tables.
    #[must_use]
    pub fn new(
        name: &'static str,
        table: &'static str,
        identifier: &'static str,
        fields: Vec<FieldDef<E>>,
    ) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(idx, def)| (def.name, idx))
            .collect::<FxHashMap<_, _>>();
        assert!(
            index.contains_key(identifier),
            "identifier '{identifier}' is not a field of {name}"
        );
        Self {
            name,
            table,
            identifier,
            fields,
            index,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn table(&self) -> &'static str {
        self.table
    }

    #[must_use]
    pub const fn identifier(&self) -> &'static str {
        self.identifier
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef<E>> {
        self.index.get(name).map(|&idx| &self.fields[idx])
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDef<E>] {
        &self.fields
    }

    #[must_use]
    pub fn identifier_field(&self) -> &FieldDef<E> {
        &self.fields[self.index[self.identifier]]
    }

    pub fn scalar_fields(&self) -> impl Iterator<Item = &FieldDef<E>> {
        self.fields.iter().filter(|def| !def.is_association())
    }

    pub fn associations(&self) -> impl Iterator<Item = &FieldDef<E>> {
        self.fields.iter().filter(|def| def.is_association())
    }

    /// Current identity of an entity, if its identifier field holds one
    #[must_use]
    pub fn identity_of(&self, entity: &E) -> Option<Identity> {
        Identity::from_value(&(self.identifier_field().get)(entity))
    }

    /// Apply a value through the field's setter.
    ///
    /// Returns `false` without touching the entity when the field is unknown or
    /// has no setter.
    pub fn apply(&self, entity: &mut E, field: &str, value: Value) -> Result<bool> {
        match self.field(field).and_then(|def| def.set) {
            Some(set) => {
                set(entity, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Snapshot all fields of an entity
    #[must_use]
    pub fn to_row(&self, entity: &E) -> Row {
        self.fields
            .iter()
            .map(|def| (def.name, (def.get)(entity)))
            .collect()
    }

    /// Look up a column in a row
    #[must_use]
    pub fn row_value<'r>(&self, row: &'r Row, field: &str) -> Option<&'r Value> {
        let idx = *self.index.get(field)?;
        match row.get(idx) {
            Some((name, value)) if *name == field => Some(value),
            _ => row.iter().find(|(name, _)| *name == field).map(|(_, v)| v),
        }
    }
}

impl<E: Default> EntityMetadata<E> {
    /// Rebuild an entity from a stored row. Fields without a setter keep their default.
    pub fn from_row(&self, row: &Row) -> Result<E> {
        let mut entity = E::default();
        for (name, value) in row {
            if let Some(set) = self.field(name).and_then(|def| def.set) {
                set(&mut entity, value.clone())?;
            }
        }
        Ok(entity)
    }
}
