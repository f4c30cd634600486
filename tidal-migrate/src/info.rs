//! Per-table migration descriptors.
//!
//! A [`MigrationInfo`] names where the not-yet-migrated rows of a table live
//! and produces the statements that hide the split from readers: a temp view
//! named after the target table that unions the source table with the
//! target's physical storage.
//!
//! While the view exists, the unqualified target name is read-only on that
//! handle. Writers address the physical table through
//! [`MigrationInfo::physical_target`] (`"main"."<target>"`); rows still in
//! the source are changed through [`MigrationInfo::physical_source`].
//! SQLite rejects qualified names inside trigger bodies, and an unqualified
//! name in a temp trigger resolves to the view again, so the view cannot
//! carry `INSTEAD OF` triggers forwarding writes.

use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use tidal_sqlite::statement::quote_identifier;
use tidal_sqlite::{MAIN_SCHEMA, Select, Statement, TEMP_SCHEMA};

use crate::error::{MigrateResult, MigrationError};

/// Prefix of every schema the migration engine attaches.
pub const SCHEMA_PREFIX: &str = "tidal_migration_";

/// Hex digits of the path digest kept in a schema name.
const SCHEMA_DIGEST_LEN: usize = 16;

/// Migration of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationInfo {
    target_table: String,
    source_table: String,
    source_schema: String,
    source_path: Option<PathBuf>,
}

impl MigrationInfo {
    /// Migrate `source_table` of the main database into `target_table`.
    pub fn new(
        target_table: impl Into<String>,
        source_table: impl Into<String>,
    ) -> MigrateResult<Self> {
        let info = Self {
            target_table: target_table.into(),
            source_table: source_table.into(),
            source_schema: MAIN_SCHEMA.to_string(),
            source_path: None,
        };
        info.validate()?;
        Ok(info)
    }

    /// Migrate `source_table` of the database file at `source_path` into
    /// `target_table` of the main database.
    ///
    /// The source database is attached under [`schema_name_for`] of its
    /// normalized path, so every table migrating out of one file shares one
    /// schema.
    pub fn with_source_database(
        target_table: impl Into<String>,
        source_table: impl Into<String>,
        source_path: impl AsRef<Path>,
    ) -> MigrateResult<Self> {
        let path = normalize_path(source_path.as_ref());
        let info = Self {
            target_table: target_table.into(),
            source_table: source_table.into(),
            source_schema: schema_name_for(&path),
            source_path: Some(path),
        };
        info.validate()?;
        Ok(info)
    }

    fn validate(&self) -> MigrateResult<()> {
        if self.target_table.is_empty() {
            return Err(MigrationError::invalid_info("", "empty target table"));
        }
        if self.source_table.is_empty() {
            return Err(MigrationError::invalid_info(
                &self.target_table,
                "empty source table",
            ));
        }
        if self.target_table.starts_with(SCHEMA_PREFIX) {
            return Err(MigrationError::invalid_info(
                &self.target_table,
                format!("names starting with '{}' are reserved", SCHEMA_PREFIX),
            ));
        }
        if self.source_path.is_none() && self.source_table.eq_ignore_ascii_case(&self.target_table)
        {
            return Err(MigrationError::invalid_info(
                &self.target_table,
                "source and target are the same table",
            ));
        }
        if let Some(path) = &self.source_path {
            if path.to_str().is_none() {
                return Err(MigrationError::invalid_info(
                    &self.target_table,
                    format!("source path {} is not valid UTF-8", path.display()),
                ));
            }
        }
        Ok(())
    }

    /// Name the application queries.
    pub fn target_table(&self) -> &str {
        &self.target_table
    }

    /// Table holding the rows that are not migrated yet.
    pub fn source_table(&self) -> &str {
        &self.source_table
    }

    /// Schema the source table is reachable under.
    pub fn source_schema(&self) -> &str {
        &self.source_schema
    }

    /// Normalized path of the source database, when it is not the main one.
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Whether the source table lives in another database file.
    pub fn is_cross_database(&self) -> bool {
        self.source_path.is_some()
    }

    /// The source path as handed to `ATTACH`.
    pub(crate) fn source_path_str(&self) -> Option<&str> {
        self.source_path.as_deref().and_then(Path::to_str)
    }

    /// Qualified name of the target's physical table, for writes while the
    /// unioned view shadows the bare name.
    pub fn physical_target(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(MAIN_SCHEMA),
            quote_identifier(&self.target_table)
        )
    }

    /// Qualified name of the source table.
    pub fn physical_source(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.source_schema),
            quote_identifier(&self.source_table)
        )
    }

    /// Statement creating the unioned view.
    ///
    /// The view lives in `temp`, where it shadows the physical target table
    /// for unqualified names on this connection only. Rows are unioned with
    /// `UNION ALL`: the row-copy driver keeps the source and the target
    /// disjoint, so no row can show up twice. The view is read-only; see
    /// [`physical_target`](Self::physical_target).
    pub fn statement_for_creating_unioned_view(&self) -> Statement {
        let select = Select::all_from(&self.source_schema, &self.source_table)
            .union_all(MAIN_SCHEMA, &self.target_table);
        Statement::create_view(TEMP_SCHEMA, &self.target_table, select)
    }

    /// Statement dropping the unioned view, exposing the physical table.
    pub fn statement_for_dropping_unioned_view(&self) -> Statement {
        Statement::drop_view(TEMP_SCHEMA, &self.target_table)
    }
}

/// Name of the schema a source database at `path` is attached under.
pub fn schema_name_for(path: &Path) -> String {
    let normalized = normalize_path(path);
    let digest = Sha256::digest(normalized.to_string_lossy().as_bytes());
    let mut name = String::with_capacity(SCHEMA_PREFIX.len() + SCHEMA_DIGEST_LEN);
    name.push_str(SCHEMA_PREFIX);
    name.push_str(&hex::encode(digest)[..SCHEMA_DIGEST_LEN]);
    name
}

/// Normalize a path lexically: `.` components are dropped and `..` folds
/// into its parent where there is one. The filesystem is not consulted.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    normalized.pop();
                } else if !matches!(
                    normalized.components().next_back(),
                    Some(Component::RootDir | Component::Prefix(_))
                ) {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}
