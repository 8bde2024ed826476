//! Relational backend on top of SQLite.
//!
//! One table per entity type, one column per field; associations store the
//! target identity. Integer identities are reserved when an entity is staged,
//! above both the stored maximum and every identity handed out before. Each
//! flush runs the whole pending-write set inside a single `BEGIN IMMEDIATE`
//! transaction and rolls back if any statement fails. The statement trace hook
//! is the backend's diagnostic logging.

use std::path::Path;

use itertools::Itertools;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, ErrorCode, params_from_iter};
use rustc_hash::FxHashMap;

use crate::backend::{
    Backend, Conditions, EntityState, LookupStrategy, Managed, PendingOp, PendingRow, UnitOfWork,
    row_matches, value_matches,
};
use crate::config::DateFormatConfig;
use crate::error::{Error, Result};
use crate::model::{Entity, FieldDef, Row, ScalarType};
use crate::value::{DATE_FORMAT, Identity, TIMESTAMP_FORMAT, Value};

/// Log target of the statement trace
pub const SQL_LOG_TARGET: &str = "entity_writer::sql";

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::from(rusqlite::types::Null),
            Self::Bool(b) => ToSqlOutput::from(*b),
            Self::Int(i) => ToSqlOutput::from(*i),
            Self::Float(x) => ToSqlOutput::from(*x),
            Self::Text(s) => ToSqlOutput::from(s.as_str()),
            Self::Date(d) => ToSqlOutput::from(d.format(DATE_FORMAT).to_string()),
            Self::Timestamp(ts) => ToSqlOutput::from(ts.format(TIMESTAMP_FORMAT).to_string()),
            Self::Ref(r) => match &r.id {
                Identity::Int(i) => ToSqlOutput::from(*i),
                Identity::Text(s) => ToSqlOutput::from(s.as_str()),
            },
        })
    }
}

fn trace_statement(sql: &str) {
    log::trace!(target: SQL_LOG_TARGET, "{sql}");
}

fn row_count(count: i64) -> Result<usize> {
    usize::try_from(count)
        .map_err(|_| Error::Sqlite(rusqlite::Error::IntegralValueOutOfRange(0, count)))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

const fn column_type(ty: ScalarType) -> &'static str {
    match ty {
        ScalarType::Bool | ScalarType::Int => "INTEGER",
        ScalarType::Float => "REAL",
        ScalarType::Text | ScalarType::Date | ScalarType::Timestamp => "TEXT",
    }
}

/// Map constraint failures to [`Error::Constraint`], everything else passes through
fn constraint_error(err: rusqlite::Error) -> Error {
    match err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            Error::Constraint(message.unwrap_or_else(|| failure.to_string()))
        }
        other => Error::Sqlite(other),
    }
}

fn decode<E>(def: &FieldDef<E>, raw: ValueRef<'_>, formats: &DateFormatConfig) -> Result<Value> {
    let stored = match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(x) => Value::Float(x),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => {
            return Err(Error::Conversion {
                field: def.name.to_string(),
                expected: def.storage_type().name(),
                found: "blob".to_string(),
            });
        }
    };
    let value = def.storage_type().coerce(def.name, stored, formats)?;
    Ok(def.hydrate(value))
}

fn read_row<E: Entity>(raw: &rusqlite::Row<'_>, formats: &DateFormatConfig) -> Result<Row> {
    E::metadata()
        .fields()
        .iter()
        .enumerate()
        .map(|(idx, def)| Ok((def.name, decode(def, raw.get_ref(idx)?, formats)?)))
        .collect()
}

fn select_sql<E: Entity>() -> String {
    let metadata = E::metadata();
    format!(
        "SELECT {} FROM {}",
        metadata.fields().iter().map(|def| quote_ident(def.name)).join(", "),
        quote_ident(metadata.table())
    )
}

/// SQLite-backed store
pub struct SqliteBackend {
    conn: Connection,
    uow: UnitOfWork,
    /// Rows loaded or written in this session, keyed by entity and identity
    identity_map: FxHashMap<(&'static str, Identity), Row>,
    /// Next integer identity to hand out, per table
    next_ids: FxHashMap<&'static str, i64>,
    formats: DateFormatConfig,
    tracing: bool,
    flushes: usize,
}

impl SqliteBackend {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    /// Wrap an existing connection. Statement tracing starts enabled.
    #[must_use]
    pub fn from_connection(mut conn: Connection) -> Self {
        conn.trace(Some(trace_statement));
        Self {
            conn,
            uow: UnitOfWork::new(),
            identity_map: FxHashMap::default(),
            next_ids: FxHashMap::default(),
            formats: DateFormatConfig::default(),
            tracing: true,
            flushes: 0,
        }
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Number of committed flushes
    #[must_use]
    pub const fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Create the table for an entity type if it does not exist
    pub fn create_table<E: Entity>(&self) -> Result<()> {
        let metadata = E::metadata();
        let columns = metadata
            .fields()
            .iter()
            .map(|def| {
                let ty = column_type(def.storage_type());
                if def.name == metadata.identifier() {
                    format!("{} {ty} PRIMARY KEY NOT NULL", quote_ident(def.name))
                } else {
                    format!("{} {ty}", quote_ident(def.name))
                }
            })
            .join(", ");
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({columns})",
            quote_ident(metadata.table())
        );
        self.conn.execute_batch(&sql)?;
        log::debug!("Ensured table {} for {}", metadata.table(), metadata.name());
        Ok(())
    }

    /// Number of stored rows of type `E`
    pub fn count<E: Entity>(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(E::TABLE));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        row_count(count)
    }

    /// Every stored entity of type `E`, ordered by identifier
    pub fn all<E: Entity>(&self) -> Result<Vec<E>> {
        let sql = format!(
            "{} ORDER BY {}",
            select_sql::<E>(),
            quote_ident(E::IDENTIFIER)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut entities = Vec::new();
        while let Some(raw) = rows.next()? {
            entities.push(E::metadata().from_row(&read_row::<E>(raw, &self.formats)?)?);
        }
        Ok(entities)
    }

    fn select_where<E: Entity>(
        &self,
        strategy: &LookupStrategy,
        conditions: &Conditions,
    ) -> Result<Option<(Identity, Row)>> {
        let mut params = Vec::with_capacity(conditions.len());
        let clauses = conditions
            .iter()
            .map(|(field, value)| {
                let column = quote_ident(field);
                match value {
                    Value::Null => format!("{column} IS NULL"),
                    Value::Text(_) if *strategy == LookupStrategy::CaseInsensitive => {
                        params.push(value);
                        format!("{column} = ? COLLATE NOCASE")
                    }
                    _ => {
                        params.push(value);
                        format!("{column} = ?")
                    }
                }
            })
            .join(" AND ");
        let sql = if clauses.is_empty() {
            select_sql::<E>()
        } else {
            format!("{} WHERE {clauses}", select_sql::<E>())
        };

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params_from_iter(params))?;
        while let Some(raw) = rows.next()? {
            let row = read_row::<E>(raw, &self.formats)?;
            let Some(id) = E::metadata()
                .row_value(&row, E::IDENTIFIER)
                .and_then(Identity::from_value)
            else {
                continue;
            };
            if !self.uow.is_shadowed(E::NAME, &id) {
                return Ok(Some((id, row)));
            }
        }
        Ok(None)
    }

    fn reserve_id(&mut self, table: &'static str, identifier: &'static str) -> Result<Identity> {
        let sql = format!(
            "SELECT COALESCE(MAX({}), 0) FROM {}",
            quote_ident(identifier),
            quote_ident(table)
        );
        let stored: i64 = self.conn.prepare_cached(&sql)?.query_row([], |row| row.get(0))?;
        let next = self.next_ids.entry(table).or_insert(1);
        let id = (*next).max(stored.saturating_add(1));
        *next = id.saturating_add(1);
        Ok(Identity::Int(id))
    }

    /// Roll back the open transaction. A failure is logged, since the error
    /// that caused the rollback is the one returned.
    fn rollback(&self, after: &str) -> bool {
        match self.conn.execute("ROLLBACK", []) {
            Ok(_) => true,
            Err(err) => {
                log::warn!("Rollback after failed {after} failed: {err}");
                false
            }
        }
    }

    fn observe_id(&mut self, table: &'static str, id: &Identity) {
        if let Identity::Int(i) = id {
            let next = self.next_ids.entry(table).or_insert(1);
            *next = (*next).max(i.saturating_add(1));
        }
    }

    fn load<E: Entity>(&mut self, id: Identity, row: Row) -> Result<Managed<E>> {
        let entity = E::metadata().from_row(&row)?;
        self.identity_map.insert((E::NAME, id.clone()), row);
        Ok(Managed::with_state(entity, EntityState::Persisted(id)))
    }

    fn write(&self, staged: &mut PendingRow) -> Result<Identity> {
        match staged.op.clone() {
            PendingOp::Insert => self.insert_row(staged),
            PendingOp::Update(id) => {
                self.update_row(staged, &id)?;
                staged.set_identifier(&id);
                Ok(id)
            }
        }
    }

    fn insert_row(&self, staged: &mut PendingRow) -> Result<Identity> {
        let explicit = staged.identifier_value().and_then(Identity::from_value);
        if explicit.is_none() && staged.id_type != ScalarType::Int {
            return Err(Error::Constraint(format!(
                "{} has no value for identifier '{}'",
                staged.entity, staged.identifier
            )));
        }
        let columns: Vec<&(&'static str, Value)> = staged
            .row
            .iter()
            .filter(|(name, _)| explicit.is_some() || *name != staged.identifier)
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(staged.table),
            columns.iter().map(|(name, _)| quote_ident(name)).join(", "),
            columns.iter().map(|_| "?").join(", ")
        );
        self.conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(columns.iter().map(|(_, value)| value)))
            .map_err(constraint_error)?;

        let id = explicit.unwrap_or_else(|| Identity::Int(self.conn.last_insert_rowid()));
        staged.set_identifier(&id);
        Ok(id)
    }

    fn update_row(&self, staged: &PendingRow, id: &Identity) -> Result<()> {
        let columns: Vec<&(&'static str, Value)> = staged
            .row
            .iter()
            .filter(|(name, _)| *name != staged.identifier)
            .collect();
        let key = quote_ident(staged.identifier);
        let assignments = if columns.is_empty() {
            format!("{key} = {key}")
        } else {
            columns
                .iter()
                .map(|(name, _)| format!("{} = ?", quote_ident(name)))
                .join(", ")
        };
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {key} = ?",
            quote_ident(staged.table)
        );
        let key_value = id.to_value();
        let params = columns
            .iter()
            .map(|(_, value)| value)
            .chain(std::iter::once(&key_value));
        let changed = self
            .conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(params))
            .map_err(constraint_error)?;
        if changed == 0 {
            return Err(Error::Constraint(format!(
                "no stored {} with identity {id}",
                staged.entity
            )));
        }
        Ok(())
    }
}

impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn supports_lookup(&self, strategy: &LookupStrategy) -> bool {
        matches!(
            strategy,
            LookupStrategy::Exact | LookupStrategy::CaseInsensitive
        )
    }

    fn find_one_by<E: Entity>(
        &mut self,
        strategy: &LookupStrategy,
        conditions: &Conditions,
    ) -> Result<Option<Managed<E>>> {
        if !self.supports_lookup(strategy) {
            return Err(Error::UnsupportedBackend(format!(
                "sqlite backend has no lookup strategy '{strategy}'"
            )));
        }
        let metadata = E::metadata();
        let matcher = |stored: &Value, wanted: &Value| value_matches(strategy, stored, wanted);
        if let Some(staged) = self
            .uow
            .find::<E>(|row| row_matches(metadata, row, conditions, &matcher))?
        {
            return Ok(Some(staged));
        }

        match self.select_where::<E>(strategy, conditions)? {
            Some((id, row)) => self.load(id, row).map(Some),
            None => Ok(None),
        }
    }

    fn find<E: Entity>(&mut self, id: &Identity) -> Result<Option<Managed<E>>> {
        if let Some(staged) = self.uow.find_by_identity::<E>(id)? {
            return Ok(Some(staged));
        }
        if let Some(row) = self.identity_map.get(&(E::NAME, id.clone())) {
            let entity = E::metadata().from_row(row)?;
            return Ok(Some(Managed::with_state(
                entity,
                EntityState::Persisted(id.clone()),
            )));
        }
        let conditions: Conditions = smallvec::smallvec![(E::IDENTIFIER, id.to_value())];
        match self.select_where::<E>(&LookupStrategy::Exact, &conditions)? {
            Some((id, row)) => self.load(id, row).map(Some),
            None => Ok(None),
        }
    }

    fn persist<E: Entity>(&mut self, entity: Managed<E>) -> Result<()> {
        let slot = self.uow.stage(entity)?;
        let Some(staged) = self.uow.get(slot) else {
            return Ok(());
        };
        if staged.op != PendingOp::Insert {
            return Ok(());
        }
        if staged.needs_identity() {
            let id = self.reserve_id(E::TABLE, E::IDENTIFIER)?;
            if let Some(staged) = self.uow.get_mut(slot) {
                staged.set_identifier(&id);
            }
        } else if let Some(id) = staged.identifier_value().and_then(Identity::from_value) {
            self.observe_id(E::TABLE, &id);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.uow.is_empty() {
            return Ok(());
        }
        let mut pending = self.uow.take();

        self.conn.execute("BEGIN IMMEDIATE", [])?;
        let written = pending
            .iter_mut()
            .map(|staged| self.write(staged))
            .collect::<Result<Vec<_>>>();
        let ids = match written {
            Ok(ids) => ids,
            Err(err) => {
                self.rollback("flush");
                return Err(err);
            }
        };
        if let Err(err) = self.conn.execute("COMMIT", []) {
            self.rollback("commit");
            return Err(err.into());
        }

        self.uow
            .record_commit(pending.iter().map(|staged| staged.entity));
        for (staged, id) in pending.into_iter().zip(ids) {
            self.identity_map.insert((staged.entity, id), staged.row);
        }
        self.flushes += 1;
        log::debug!("SQLite backend committed flush #{}", self.flushes);
        Ok(())
    }

    fn clear<E: Entity>(&mut self) {
        let dropped = self.uow.discard(E::NAME);
        self.identity_map.retain(|(entity, _), _| *entity != E::NAME);
        if dropped > 0 {
            log::debug!("Discarded {dropped} pending {} writes", E::NAME);
        }
    }

    fn truncate<E: Entity>(&mut self) -> Result<()> {
        let removed = self
            .conn
            .execute(&format!("DELETE FROM {}", quote_ident(E::TABLE)), [])?;
        self.identity_map.retain(|(entity, _), _| *entity != E::NAME);
        log::debug!("Truncated {} ({removed} rows)", E::TABLE);
        Ok(())
    }

    fn pending(&self) -> usize {
        self.uow.len()
    }

    fn commits(&self, entity: &'static str) -> usize {
        self.uow.commits(entity)
    }

    fn diagnostics(&self) -> Option<bool> {
        Some(self.tracing)
    }

    fn set_diagnostics(&mut self, enabled: bool) {
        if enabled {
            self.conn.trace(Some(trace_statement));
        } else {
            self.conn.trace(None);
        }
        self.tracing = enabled;
    }
}
