//! Writes entity state into the SQL index.
//!
//! Every qualified name owns one table. A row holds either a scalar, the
//! type name of a value composite (whose members become child rows pointing
//! back through `parent_qname`), or the key of an associated entity.
//! Collections produce one row per element; nested collections record one
//! index column per level. Null values and empty collections write no rows.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::EntityState;
use crate::query::value::Value;
use crate::sql::bind::{to_sql_value, UnbindableValue};
use crate::sql::metadata::{IndexingMetadata, IndexingState, QNameInfo};
use crate::sql::names::{
    collection_index, ASSOCIATION_INDEX, ASSOCIATION_NAME, ENTITY_IDENTITY, ENTITY_PK,
    ENTITY_TABLE, ENTITY_TYPES_TABLE, ENTITY_TYPE_FK, ENTITY_TYPE_NAME, ENTITY_TYPE_PK,
    PARENT_QNAME, QNAME_ID, QNAME_VALUE,
};
use crate::types::{EntityReference, QualifiedName};

/// Failures while writing the index.
#[derive(Debug, Error)]
pub enum IndexingError {
    /// SQLite rejected a statement.
    #[error("index write failed")]
    Sql(#[from] rusqlite::Error),
    /// The entity's type has no key in the layout.
    #[error("entity type '{0}' is not indexed")]
    UnknownEntityType(String),
    /// The layout has no table for a member being written.
    #[error("no index table for '{0}'")]
    MissingQNameInfo(QualifiedName),
    /// An association points at an entity that is not in the index.
    #[error("association target '{0}' is not indexed")]
    UnindexedTarget(EntityReference),
    /// A property value has no column representation.
    #[error(transparent)]
    Unbindable(#[from] UnbindableValue),
}

impl IndexingError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            IndexingError::Sql(_) => "Sql",
            IndexingError::UnknownEntityType(_) => "UnknownEntityType",
            IndexingError::MissingQNameInfo(_) => "MissingQNameInfo",
            IndexingError::UnindexedTarget(_) => "UnindexedTarget",
            IndexingError::Unbindable(_) => "Unbindable",
        }
    }
}

/// Result alias for index writes.
pub type Result<T> = std::result::Result<T, IndexingError>;

/// How a row relates to its association container.
#[derive(Clone, Copy)]
enum Slot<'a> {
    Plain,
    Index(usize),
    Name(&'a str),
}

/// Creates index tables and writes entities into them.
#[derive(Debug, Clone)]
pub struct SqlIndexer {
    state: Arc<IndexingState>,
}

impl SqlIndexer {
    /// Writer for the layout in `state`.
    pub fn new(state: Arc<IndexingState>) -> Self {
        SqlIndexer { state }
    }

    /// Layout this writer follows.
    pub fn state(&self) -> &Arc<IndexingState> {
        &self.state
    }

    fn table(&self, name: &str) -> String {
        format!("{}.{}", self.state.schema_name(), name)
    }

    fn info(&self, name: &QualifiedName) -> Result<&QNameInfo> {
        self.state
            .qname_info(name)
            .ok_or_else(|| IndexingError::MissingQNameInfo(name.clone()))
    }

    /// Creates every table and registers entity types. Existing tables are
    /// left in place.
    pub fn create_schema(&self, conn: &Connection) -> Result<()> {
        let mut ddl = String::new();
        let _ = writeln!(
            ddl,
            "CREATE TABLE IF NOT EXISTS {} ({ENTITY_TYPE_PK} INTEGER PRIMARY KEY, \
             {ENTITY_TYPE_NAME} TEXT NOT NULL UNIQUE);",
            self.table(ENTITY_TYPES_TABLE)
        );
        let _ = writeln!(
            ddl,
            "CREATE TABLE IF NOT EXISTS {} ({ENTITY_PK} INTEGER PRIMARY KEY, \
             {ENTITY_TYPE_FK} INTEGER NOT NULL REFERENCES {ENTITY_TYPES_TABLE} ({ENTITY_TYPE_PK}), \
             {ENTITY_IDENTITY} TEXT NOT NULL UNIQUE);",
            self.table(ENTITY_TABLE)
        );
        for (_, info) in self.state.qnames() {
            let mut columns = format!(
                "{QNAME_ID} INTEGER PRIMARY KEY, {ENTITY_PK} INTEGER NOT NULL, \
                 {PARENT_QNAME} INTEGER, {QNAME_VALUE}, {ASSOCIATION_INDEX} INTEGER, \
                 {ASSOCIATION_NAME} TEXT"
            );
            for level in 1..=info.collection_depth {
                let _ = write!(columns, ", {} INTEGER", collection_index(level));
            }
            let _ = writeln!(
                ddl,
                "CREATE TABLE IF NOT EXISTS {} ({columns});",
                self.table(&info.table_name)
            );
            let _ = writeln!(
                ddl,
                "CREATE INDEX IF NOT EXISTS {}.{}_entity ON {} ({ENTITY_PK});",
                self.state.schema_name(),
                info.table_name,
                info.table_name
            );
        }
        conn.execute_batch(&ddl)?;

        let mut insert = conn.prepare(&format!(
            "INSERT OR IGNORE INTO {} ({ENTITY_TYPE_PK}, {ENTITY_TYPE_NAME}) VALUES (?1, ?2)",
            self.table(ENTITY_TYPES_TABLE)
        ))?;
        for info in self.state.entity_types() {
            insert.execute(params![info.entity_type_pk, info.type_name])?;
        }
        debug!(
            tables = self.state.qnames().count(),
            "created index schema"
        );
        Ok(())
    }

    /// Writes `entities` in one transaction, replacing earlier rows of the
    /// same identities. Association targets must be indexed already or be
    /// part of the batch.
    pub fn index(&self, conn: &mut Connection, entities: &[Arc<EntityState>]) -> Result<usize> {
        let tx = conn.transaction()?;
        let mut keys = HashMap::with_capacity(entities.len());
        let mut written = Vec::with_capacity(entities.len());
        for entity in entities {
            let pk = self.upsert_entity(&tx, entity)?;
            keys.insert(entity.entity_reference().clone(), pk);
            written.push((pk, entity));
        }
        for (pk, entity) in written {
            self.write_members(&tx, &mut keys, pk, entity)?;
        }
        tx.commit()?;
        info!(entities = entities.len(), "indexed entities");
        Ok(entities.len())
    }

    /// Deletes the rows of `reference`; returns whether it was indexed.
    pub fn remove(&self, conn: &mut Connection, reference: &EntityReference) -> Result<bool> {
        let tx = conn.transaction()?;
        let Some(pk) = self.entity_key(&tx, reference)? else {
            return Ok(false);
        };
        self.clear_members(&tx, pk)?;
        tx.execute(
            &format!("DELETE FROM {} WHERE {ENTITY_PK} = ?1", self.table(ENTITY_TABLE)),
            params![pk],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn entity_key(&self, tx: &Transaction<'_>, reference: &EntityReference) -> Result<Option<i64>> {
        Ok(tx
            .query_row(
                &format!(
                    "SELECT {ENTITY_PK} FROM {} WHERE {ENTITY_IDENTITY} = ?1",
                    self.table(ENTITY_TABLE)
                ),
                params![reference.identity()],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn clear_members(&self, tx: &Transaction<'_>, pk: i64) -> Result<()> {
        for (_, info) in self.state.qnames() {
            tx.execute(
                &format!(
                    "DELETE FROM {} WHERE {ENTITY_PK} = ?1",
                    self.table(&info.table_name)
                ),
                params![pk],
            )?;
        }
        Ok(())
    }

    fn upsert_entity(&self, tx: &Transaction<'_>, entity: &EntityState) -> Result<i64> {
        let type_name = crate::model::Composite::type_name(entity);
        let type_pk = self
            .state
            .entity_type(type_name)
            .map(|info| info.entity_type_pk)
            .ok_or_else(|| IndexingError::UnknownEntityType(type_name.to_owned()))?;
        let reference = entity.entity_reference();
        if let Some(pk) = self.entity_key(tx, reference)? {
            self.clear_members(tx, pk)?;
            tx.execute(
                &format!(
                    "UPDATE {} SET {ENTITY_TYPE_FK} = ?1 WHERE {ENTITY_PK} = ?2",
                    self.table(ENTITY_TABLE)
                ),
                params![type_pk, pk],
            )?;
            return Ok(pk);
        }
        tx.execute(
            &format!(
                "INSERT INTO {} ({ENTITY_TYPE_FK}, {ENTITY_IDENTITY}) VALUES (?1, ?2)",
                self.table(ENTITY_TABLE)
            ),
            params![type_pk, reference.identity()],
        )?;
        Ok(tx.last_insert_rowid())
    }

    fn target_key(
        &self,
        tx: &Transaction<'_>,
        keys: &mut HashMap<EntityReference, i64>,
        reference: Option<&EntityReference>,
    ) -> Result<Option<i64>> {
        let Some(reference) = reference else {
            return Ok(None);
        };
        if let Some(pk) = keys.get(reference) {
            return Ok(Some(*pk));
        }
        let pk = self
            .entity_key(tx, reference)?
            .ok_or_else(|| IndexingError::UnindexedTarget(reference.clone()))?;
        keys.insert(reference.clone(), pk);
        Ok(Some(pk))
    }

    fn write_members(
        &self,
        tx: &Transaction<'_>,
        keys: &mut HashMap<EntityReference, i64>,
        pk: i64,
        entity: &EntityState,
    ) -> Result<()> {
        for (qname, value) in entity.properties() {
            self.write_property(tx, qname, pk, None, value)?;
        }
        for (qname, target) in entity.associations() {
            if let Some(target_pk) = self.target_key(tx, keys, target.and_then(|t| t.reference()))? {
                self.insert_row(tx, self.info(qname)?, pk, None, SqlValue::Integer(target_pk), Slot::Plain, &[])?;
            }
        }
        for (qname, members) in entity.many_associations() {
            let info = self.info(qname)?;
            for (i, member) in members.iter().enumerate() {
                if let Some(target_pk) = self.target_key(tx, keys, member.reference())? {
                    self.insert_row(tx, info, pk, None, SqlValue::Integer(target_pk), Slot::Index(i), &[])?;
                }
            }
        }
        for (qname, members) in entity.named_associations() {
            let info = self.info(qname)?;
            for (name, member) in members {
                if let Some(target_pk) = self.target_key(tx, keys, member.reference())? {
                    self.insert_row(tx, info, pk, None, SqlValue::Integer(target_pk), Slot::Name(name), &[])?;
                }
            }
        }
        Ok(())
    }

    fn write_property(
        &self,
        tx: &Transaction<'_>,
        qname: &QualifiedName,
        pk: i64,
        parent: Option<i64>,
        value: &Value,
    ) -> Result<()> {
        let info = self.info(qname)?;
        let mut indexes = Vec::with_capacity(info.collection_depth);
        self.write_element(tx, info, pk, parent, value, &mut indexes)
    }

    fn write_element(
        &self,
        tx: &Transaction<'_>,
        info: &QNameInfo,
        pk: i64,
        parent: Option<i64>,
        value: &Value,
        indexes: &mut Vec<usize>,
    ) -> Result<()> {
        match value {
            Value::Null => Ok(()),
            Value::List(items) if indexes.len() < info.collection_depth => {
                for (i, item) in items.iter().enumerate() {
                    indexes.push(i);
                    self.write_element(tx, info, pk, parent, item, indexes)?;
                    indexes.pop();
                }
                Ok(())
            }
            Value::Composite(state) => {
                let row = self.insert_row(tx, info, pk, parent, to_sql_value(value)?, Slot::Plain, indexes)?;
                for (child, child_value) in state.properties() {
                    self.write_property(tx, child, pk, Some(row), child_value)?;
                }
                Ok(())
            }
            scalar => {
                self.insert_row(tx, info, pk, parent, to_sql_value(scalar)?, Slot::Plain, indexes)?;
                Ok(())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_row(
        &self,
        tx: &Transaction<'_>,
        info: &QNameInfo,
        pk: i64,
        parent: Option<i64>,
        value: SqlValue,
        slot: Slot<'_>,
        indexes: &[usize],
    ) -> Result<i64> {
        let mut columns = vec![
            ENTITY_PK.to_owned(),
            PARENT_QNAME.to_owned(),
            QNAME_VALUE.to_owned(),
        ];
        let mut values = vec![
            SqlValue::Integer(pk),
            parent.map_or(SqlValue::Null, SqlValue::Integer),
            value,
        ];
        match slot {
            Slot::Plain => {}
            Slot::Index(i) => {
                columns.push(ASSOCIATION_INDEX.to_owned());
                values.push(SqlValue::Integer(i as i64));
            }
            Slot::Name(name) => {
                columns.push(ASSOCIATION_NAME.to_owned());
                values.push(SqlValue::Text(name.to_owned()));
            }
        }
        for (level, index) in indexes.iter().enumerate() {
            columns.push(collection_index(level + 1));
            values.push(SqlValue::Integer(*index as i64));
        }
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            self.table(&info.table_name),
            columns.join(", ")
        );
        tx.prepare_cached(&sql)?.execute(params_from_iter(values))?;
        Ok(tx.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::people;

    fn setup() -> (Connection, SqlIndexer) {
        let conn = Connection::open_in_memory().unwrap();
        let indexer = SqlIndexer::new(Arc::new(IndexingState::from_model(&people(), "main")));
        indexer.create_schema(&conn).unwrap();
        (conn, indexer)
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM main.{table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn writes_scalars_collections_and_value_composites() {
        let (mut conn, indexer) = setup();
        let model = people();
        let home = model
            .new_value("Address")
            .unwrap()
            .with("city", "Oslo")
            .unwrap();
        let alice = model
            .new_entity("Person", "alice")
            .unwrap()
            .with("name", "Alice")
            .unwrap()
            .with("tags", vec!["a", "b"])
            .unwrap()
            .with("address", home)
            .unwrap();
        indexer.index(&mut conn, &[Arc::new(alice)]).unwrap();

        assert_eq!(count(&conn, "entities"), 1);
        assert_eq!(count(&conn, "nameable_name"), 1);
        assert_eq!(count(&conn, "person_age"), 0);
        assert_eq!(count(&conn, "person_tags"), 2);
        let city_parent: i64 = conn
            .query_row(
                "SELECT c.parent_qname FROM main.address_city c \
                 JOIN main.person_address a ON a.qname_id = c.parent_qname",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(city_parent > 0);
        let second: String = conn
            .query_row(
                "SELECT qname_value FROM main.person_tags WHERE collection_index_1 = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(second, "b");
    }

    #[test]
    fn associations_store_target_keys_and_reindexing_replaces_rows() {
        let (mut conn, indexer) = setup();
        let model = people();
        let rex = Arc::new(model.new_entity("Pet", "rex").unwrap());
        let bob = Arc::new(model.new_entity("Person", "bob").unwrap());
        let alice = Arc::new(
            model
                .new_entity("Person", "alice")
                .unwrap()
                .with_association("spouse", Some(&bob))
                .unwrap()
                .with_many("friends", &[bob.clone()])
                .unwrap()
                .with_named("pets", &[("dog", rex.clone())])
                .unwrap(),
        );
        indexer
            .index(&mut conn, &[rex, bob.clone(), alice.clone()])
            .unwrap();
        assert_eq!(count(&conn, "person_spouse"), 1);
        let name: String = conn
            .query_row("SELECT association_name FROM main.person_pets", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "dog");

        indexer.index(&mut conn, &[alice]).unwrap();
        assert_eq!(count(&conn, "person_spouse"), 1);
        assert_eq!(count(&conn, "entities"), 3);

        assert!(indexer.remove(&mut conn, &EntityReference::new("bob")).unwrap());
        assert!(!indexer.remove(&mut conn, &EntityReference::new("bob")).unwrap());
    }

    #[test]
    fn unindexed_targets_are_rejected() {
        let (mut conn, indexer) = setup();
        let model = people();
        let ghost = Arc::new(model.new_entity("Person", "ghost").unwrap());
        let alice = model
            .new_entity("Person", "alice")
            .unwrap()
            .with_association("spouse", Some(&ghost))
            .unwrap();
        let err = indexer.index(&mut conn, &[Arc::new(alice)]).unwrap_err();
        assert_eq!(err.code(), "UnindexedTarget");
        assert_eq!(count(&conn, "entities"), 0);
    }
}
