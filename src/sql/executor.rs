//! Executes compiled queries against a SQLite connection.

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection};
use tracing::{trace, warn};

use crate::query::finder::{EntityFinder, FinderResult, Query};
use crate::sql::parser::{ResultShape, SqlQueryParser};
use crate::types::EntityReference;

/// [`EntityFinder`] backed by the SQL index.
///
/// Connection use is serialized through the mutex; every call runs in a
/// read-only scope that is rolled back when the call returns.
#[derive(Debug, Clone)]
pub struct SqlEntityFinder {
    connection: Arc<Mutex<Connection>>,
    parser: SqlQueryParser,
}

impl SqlEntityFinder {
    /// Finder compiling with `parser` and reading through `connection`.
    pub fn new(connection: Arc<Mutex<Connection>>, parser: SqlQueryParser) -> Self {
        SqlEntityFinder { connection, parser }
    }

    /// The compiler used by this finder.
    pub fn parser(&self) -> &SqlQueryParser {
        &self.parser
    }

    fn read<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> FinderResult<T> {
        let conn = self.connection.lock();
        let _scope = ReadOnlyScope::enter(&conn)?;
        Ok(f(&conn)?)
    }
}

/// Read-only window over a connection.
///
/// Saves `PRAGMA query_only`, forces it on and opens a deferred transaction
/// unless one is already active. Dropping the scope rolls back the
/// transaction it opened and restores the saved flag, on every exit path.
struct ReadOnlyScope<'c> {
    conn: &'c Connection,
    query_only: bool,
    began: bool,
}

impl<'c> ReadOnlyScope<'c> {
    fn enter(conn: &'c Connection) -> rusqlite::Result<Self> {
        let query_only: bool = conn.query_row("PRAGMA query_only", [], |row| row.get(0))?;
        conn.pragma_update(None, "query_only", true)?;
        let mut scope = ReadOnlyScope {
            conn,
            query_only,
            began: false,
        };
        if conn.is_autocommit() {
            conn.execute_batch("BEGIN DEFERRED")?;
            scope.began = true;
        }
        Ok(scope)
    }
}

impl Drop for ReadOnlyScope<'_> {
    fn drop(&mut self) {
        if self.began {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "failed to roll back read-only scope");
            }
        }
        if let Err(e) = self.conn.pragma_update(None, "query_only", self.query_only) {
            warn!(error = %e, "failed to restore query_only");
        }
    }
}

impl EntityFinder for SqlEntityFinder {
    fn find_entities(&self, query: &Query) -> FinderResult<Vec<EntityReference>> {
        if query.is_empty_page() {
            trace!(result_type = %query.result_type, "empty page requested");
            return Ok(Vec::new());
        }
        let compiled = self.parser.compile(query, false)?;
        let skip = match compiled.shape {
            ResultShape::Scrollable { first_result } => first_result,
            _ => 0,
        };
        let limit = query.max_results.map(|n| n as usize);
        self.read(|conn| {
            let mut stmt = conn.prepare(&compiled.sql)?;
            let mut rows = stmt.query(params_from_iter(compiled.values.iter()))?;
            let mut skipped = 0;
            let mut found = Vec::new();
            while limit.map_or(true, |limit| found.len() < limit) {
                let Some(row) = rows.next()? else {
                    break;
                };
                if skipped < skip {
                    skipped += 1;
                    continue;
                }
                found.push(EntityReference::new(row.get::<_, String>(0)?));
            }
            Ok(found)
        })
    }

    fn find_entity(&self, query: &Query) -> FinderResult<Option<EntityReference>> {
        if query.is_empty_page() {
            trace!(result_type = %query.result_type, "empty page requested");
            return Ok(None);
        }
        let compiled = self.parser.compile(query, false)?;
        let skip = match compiled.shape {
            ResultShape::Scrollable { first_result } => first_result as usize,
            _ => 0,
        };
        self.read(|conn| {
            let mut stmt = conn.prepare(&compiled.sql)?;
            let mut rows = stmt.query(params_from_iter(compiled.values.iter()))?;
            for _ in 0..skip {
                if rows.next()?.is_none() {
                    return Ok(None);
                }
            }
            match rows.next()? {
                Some(row) => Ok(Some(EntityReference::new(row.get::<_, String>(0)?))),
                None => Ok(None),
            }
        })
    }

    fn count_entities(&self, query: &Query) -> FinderResult<u64> {
        let compiled = self.parser.compile(query, true)?;
        self.read(|conn| {
            let count: i64 = conn.query_row(
                &compiled.sql,
                params_from_iter(compiled.values.iter()),
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
    }
}
