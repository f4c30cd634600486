//! Database handles.
//!
//! A [`Handle`] is a single connection owned by one thread at a time. The
//! setup pipeline and the migration engine talk to handles only through
//! this trait; [`SqliteHandle`] is the implementation backed by `rusqlite`.

use std::collections::HashMap;

use rusqlite::types::FromSql;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, trace, warn};

use crate::config::{DatabasePath, SqliteConfig};
use crate::error::{SqliteError, SqliteResult};
use crate::statement::{MAIN_SCHEMA, Statement, TEMP_SCHEMA, TransactionMode, quote_identifier};

/// Who attached a schema to a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaOrigin {
    /// Attached by the migration engine; it may detach it again.
    Migration,
    /// Attached by the application, or by anything the handle did not
    /// record. Never detached by the engine.
    Application,
}

/// A schema currently attached to a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedSchema {
    /// Database file backing the schema (empty for in-memory databases).
    pub path: String,
    /// Who attached it.
    pub origin: SchemaOrigin,
}

/// Counters kept by a handle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HandleStats {
    /// Statements executed, including transaction control.
    pub statements: u64,
    /// Statements that changed the connection's schema.
    pub schema_changes: u64,
    /// Transactions committed.
    pub commits: u64,
    /// Transactions rolled back.
    pub rollbacks: u64,
}

/// The operations the setup pipeline needs from a connection.
pub trait Handle: Send {
    /// Execute a statement.
    fn execute(&mut self, statement: &Statement) -> SqliteResult<()>;

    /// Run `body` inside a transaction.
    ///
    /// The transaction commits when `body` returns `Ok` and rolls back
    /// otherwise; the error from `body` is returned unchanged.
    fn run_transaction(
        &mut self,
        body: &mut dyn FnMut(&mut dyn Handle) -> SqliteResult<()>,
    ) -> SqliteResult<()>;

    /// Check whether `schema.table` exists.
    fn table_exists(&mut self, schema: &str, table: &str) -> SqliteResult<bool>;

    /// Check whether `schema.view` exists.
    fn view_exists(&mut self, schema: &str, view: &str) -> SqliteResult<bool>;

    /// The auxiliary schemas currently attached, keyed by schema name.
    ///
    /// `main` and `temp` are never included.
    fn attached_schemas(&mut self) -> SqliteResult<HashMap<String, AttachedSchema>>;

    /// Attach the database at `path` as `schema`, recording `origin`.
    fn attach(&mut self, path: &str, schema: &str, origin: SchemaOrigin) -> SqliteResult<()>;

    /// Detach `schema`.
    fn detach(&mut self, schema: &str) -> SqliteResult<()>;
}

/// A SQLite connection.
pub struct SqliteHandle {
    conn: Connection,
    path: DatabasePath,
    origins: HashMap<String, SchemaOrigin>,
    stats: HandleStats,
}

impl SqliteHandle {
    /// Open a connection to the configured database.
    ///
    /// No pragmas are applied here; that is the job of the setup pipeline.
    pub fn open(config: &SqliteConfig) -> SqliteResult<Self> {
        let conn = match &config.path {
            DatabasePath::Memory => Connection::open_in_memory()?,
            DatabasePath::File(path) => Connection::open(path)?,
        };
        debug!(path = %config.path, "Opened SQLite handle");

        Ok(Self {
            conn,
            path: config.path.clone(),
            origins: HashMap::new(),
            stats: HandleStats::default(),
        })
    }

    /// Path of the main database.
    pub fn path(&self) -> &DatabasePath {
        &self.path
    }

    /// Statement counters for this handle.
    pub fn stats(&self) -> HandleStats {
        self.stats
    }

    /// Get the inner connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run a query returning a single value.
    pub fn query_scalar<T: FromSql>(&self, sql: &str) -> SqliteResult<T> {
        debug!(sql = %sql, "Executing query_scalar");
        Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
    }

    /// Run a query and collect its first column.
    pub fn query_column<T: FromSql>(&self, sql: &str) -> SqliteResult<Vec<T>> {
        debug!(sql = %sql, "Executing query_column");
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let results: Result<Vec<T>, _> = rows.collect();
        Ok(results?)
    }

    fn master_contains(&self, schema: &str, kind: &str, name: &str) -> SqliteResult<bool> {
        let sql = format!(
            "SELECT 1 FROM {}.sqlite_master WHERE type = ?1 AND name = ?2 COLLATE NOCASE",
            quote_identifier(schema)
        );
        trace!(schema = %schema, kind = %kind, name = %name, "Checking sqlite_master");
        let found = self
            .conn
            .query_row(&sql, [kind, name], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }
}

impl Handle for SqliteHandle {
    fn execute(&mut self, statement: &Statement) -> SqliteResult<()> {
        let sql = statement.to_sql();
        debug!(sql = %sql, "Executing statement");

        self.conn.execute_batch(&sql)?;

        self.stats.statements += 1;
        if statement.is_schema_change() {
            self.stats.schema_changes += 1;
        }
        Ok(())
    }

    fn run_transaction(
        &mut self,
        body: &mut dyn FnMut(&mut dyn Handle) -> SqliteResult<()>,
    ) -> SqliteResult<()> {
        self.execute(&Statement::Begin(TransactionMode::Deferred))?;

        let outcome = body(self).and_then(|()| self.execute(&Statement::Commit));
        match outcome {
            Ok(()) => {
                self.stats.commits += 1;
                Ok(())
            }
            Err(err) => {
                // A failed COMMIT may already have ended the transaction.
                if !self.conn.is_autocommit() {
                    if let Err(rollback_err) = self.execute(&Statement::Rollback) {
                        warn!(error = %rollback_err, "Rollback failed");
                        return Err(SqliteError::transaction(format!(
                            "{} (rollback also failed: {})",
                            err, rollback_err
                        )));
                    }
                }
                self.stats.rollbacks += 1;
                debug!(error = %err, "Transaction rolled back");
                Err(err)
            }
        }
    }

    fn table_exists(&mut self, schema: &str, table: &str) -> SqliteResult<bool> {
        self.master_contains(schema, "table", table)
    }

    fn view_exists(&mut self, schema: &str, view: &str) -> SqliteResult<bool> {
        self.master_contains(schema, "view", view)
    }

    fn attached_schemas(&mut self) -> SqliteResult<HashMap<String, AttachedSchema>> {
        let mut stmt = self.conn.prepare("PRAGMA database_list")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, Option<String>>(2)?))
        })?;

        let mut attached = HashMap::new();
        for row in rows {
            let (name, file) = row?;
            if name == MAIN_SCHEMA || name == TEMP_SCHEMA {
                continue;
            }
            let origin = self
                .origins
                .get(&name)
                .copied()
                .unwrap_or(SchemaOrigin::Application);
            attached.insert(
                name,
                AttachedSchema {
                    path: file.unwrap_or_default(),
                    origin,
                },
            );
        }

        // Forget schemas detached behind our back through raw SQL.
        self.origins.retain(|name, _| attached.contains_key(name));
        Ok(attached)
    }

    fn attach(&mut self, path: &str, schema: &str, origin: SchemaOrigin) -> SqliteResult<()> {
        self.execute(&Statement::attach(path, schema))?;
        self.origins.insert(schema.to_string(), origin);
        Ok(())
    }

    fn detach(&mut self, schema: &str) -> SqliteResult<()> {
        self.execute(&Statement::detach(schema))?;
        self.origins.remove(schema);
        Ok(())
    }
}
