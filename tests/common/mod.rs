//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;

use tempfile::TempDir;
use tidal::sqlite::{
    AttachedSchema, Handle, SchemaOrigin, SqliteConfig, SqliteError, SqliteHandle, SqliteResult,
    Statement, TransactionMode,
};

/// Install a test subscriber once; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A scratch directory holding the main database and any source databases.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.path().join(file)
    }

    pub fn main_path(&self) -> PathBuf {
        self.path("main.db")
    }

    pub fn config(&self) -> SqliteConfig {
        SqliteConfig::file(self.main_path())
    }

    /// Open a plain handle on `file`, without any setup stage.
    pub fn open(&self, file: &str) -> SqliteHandle {
        let mut handle =
            SqliteHandle::open(&SqliteConfig::file(self.path(file))).expect("Failed to open");
        handle
            .execute(&Statement::raw("PRAGMA busy_timeout = 5000"))
            .expect("Failed to set busy timeout");
        handle
    }

    pub fn open_main(&self) -> SqliteHandle {
        self.open("main.db")
    }

    /// Run `sql` against `file` on a throwaway handle.
    pub fn run(&self, file: &str, sql: &str) {
        self.open(file)
            .execute(&Statement::raw(sql))
            .expect("Failed to run fixture SQL");
    }

    /// Run `sql` against `file` in a write transaction, the way the row-copy
    /// driver moves a batch.
    pub fn run_batch(&self, file: &str, sql: &str) {
        let mut driver = self.open(file);
        driver
            .execute(&Statement::Begin(TransactionMode::Immediate))
            .expect("Failed to begin batch");
        driver
            .execute(&Statement::raw(sql))
            .expect("Failed to run batch");
        driver
            .execute(&Statement::Commit)
            .expect("Failed to commit batch");
    }
}

/// Count the rows visible under `table` on `handle`.
pub fn count(handle: &SqliteHandle, table: &str) -> i64 {
    handle
        .query_scalar(&format!("SELECT count(*) FROM \"{}\"", table))
        .expect("Failed to count rows")
}

/// A handle that fails chosen statements.
///
/// Transactions are driven through `execute`, so injected failures surface
/// in the middle of a transaction exactly where a real error would.
pub struct FaultyHandle {
    inner: SqliteHandle,
    fail_create_of: Option<String>,
    fail_drop_of: Option<String>,
}

impl FaultyHandle {
    pub fn new(inner: SqliteHandle) -> Self {
        Self {
            inner,
            fail_create_of: None,
            fail_drop_of: None,
        }
    }

    /// Fail every `CREATE VIEW` of `name`.
    pub fn fail_creating(&mut self, name: &str) {
        self.fail_create_of = Some(name.to_string());
    }

    /// Fail every `DROP VIEW` of `name`.
    pub fn fail_dropping(&mut self, name: &str) {
        self.fail_drop_of = Some(name.to_string());
    }

    pub fn heal(&mut self) {
        self.fail_create_of = None;
        self.fail_drop_of = None;
    }

    pub fn inner(&self) -> &SqliteHandle {
        &self.inner
    }
}

impl Handle for FaultyHandle {
    fn execute(&mut self, statement: &Statement) -> SqliteResult<()> {
        let (name, target) = match statement {
            Statement::CreateView { name, .. } => (name, &self.fail_create_of),
            Statement::DropView { name, .. } => (name, &self.fail_drop_of),
            _ => return self.inner.execute(statement),
        };
        if target.as_deref() == Some(name.as_str()) {
            return Err(SqliteError::statement(format!(
                "injected failure on {}",
                statement
            )));
        }
        self.inner.execute(statement)
    }

    fn run_transaction(
        &mut self,
        body: &mut dyn FnMut(&mut dyn Handle) -> SqliteResult<()>,
    ) -> SqliteResult<()> {
        self.execute(&Statement::Begin(TransactionMode::Deferred))?;
        match body(self).and_then(|()| self.execute(&Statement::Commit)) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.execute(&Statement::Rollback)?;
                Err(err)
            }
        }
    }

    fn table_exists(&mut self, schema: &str, table: &str) -> SqliteResult<bool> {
        self.inner.table_exists(schema, table)
    }

    fn view_exists(&mut self, schema: &str, view: &str) -> SqliteResult<bool> {
        self.inner.view_exists(schema, view)
    }

    fn attached_schemas(&mut self) -> SqliteResult<HashMap<String, AttachedSchema>> {
        self.inner.attached_schemas()
    }

    fn attach(&mut self, path: &str, schema: &str, origin: SchemaOrigin) -> SqliteResult<()> {
        self.inner.attach(path, schema, origin)
    }

    fn detach(&mut self, schema: &str) -> SqliteResult<()> {
        self.inner.detach(schema)
    }
}
