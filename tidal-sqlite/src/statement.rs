//! SQL statements issued by handles and setup stages.
//!
//! Only the statements the setup pipeline needs are modelled; anything else
//! goes through [`Statement::Raw`].

use std::fmt;

/// Schema name of the main database file.
pub const MAIN_SCHEMA: &str = "main";

/// Schema name of the connection-local temporary database.
pub const TEMP_SCHEMA: &str = "temp";

/// Quote an identifier for SQLite.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for SQLite.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Transaction behavior for `BEGIN`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransactionMode {
    /// Locks are acquired on first access.
    #[default]
    Deferred,
    /// A write lock is acquired immediately.
    Immediate,
}

impl TransactionMode {
    /// Get the SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Deferred => "DEFERRED",
            Self::Immediate => "IMMEDIATE",
        }
    }
}

/// A `SELECT * FROM schema.table` term, optionally unioned with others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    sources: Vec<(String, String)>,
}

impl Select {
    /// Select every column of `schema.table`.
    pub fn all_from(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            sources: vec![(schema.into(), table.into())],
        }
    }

    /// Append `UNION ALL SELECT * FROM schema.table`.
    pub fn union_all(mut self, schema: impl Into<String>, table: impl Into<String>) -> Self {
        self.sources.push((schema.into(), table.into()));
        self
    }

    /// Render the select.
    pub fn to_sql(&self) -> String {
        self.sources
            .iter()
            .map(|(schema, table)| {
                format!(
                    "SELECT * FROM {}.{}",
                    quote_identifier(schema),
                    quote_identifier(table)
                )
            })
            .collect::<Vec<_>>()
            .join(" UNION ALL ")
    }
}

/// A statement a [`Handle`](crate::handle::Handle) can execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `ATTACH 'path' AS schema`.
    Attach {
        /// Database file to attach.
        path: String,
        /// Schema name to attach it under.
        schema: String,
    },
    /// `DETACH schema`.
    Detach {
        /// Schema to detach.
        schema: String,
    },
    /// `CREATE [TEMP] VIEW [IF NOT EXISTS] schema.name AS select`.
    CreateView {
        /// Schema that owns the view.
        schema: String,
        /// View name.
        name: String,
        /// View body.
        select: Select,
        /// Whether to add `IF NOT EXISTS`.
        if_not_exists: bool,
    },
    /// `DROP VIEW [IF EXISTS] schema.name`.
    DropView {
        /// Schema that owns the view.
        schema: String,
        /// View name.
        name: String,
        /// Whether to add `IF EXISTS`.
        if_exists: bool,
    },
    /// `BEGIN mode`.
    Begin(TransactionMode),
    /// `COMMIT`.
    Commit,
    /// `ROLLBACK`.
    Rollback,
    /// Arbitrary SQL, possibly several statements.
    Raw(String),
}

impl Statement {
    /// Attach `path` as `schema`.
    pub fn attach(path: impl Into<String>, schema: impl Into<String>) -> Self {
        Self::Attach {
            path: path.into(),
            schema: schema.into(),
        }
    }

    /// Detach `schema`.
    pub fn detach(schema: impl Into<String>) -> Self {
        Self::Detach {
            schema: schema.into(),
        }
    }

    /// Create a view in `schema` unless it already exists.
    pub fn create_view(schema: impl Into<String>, name: impl Into<String>, select: Select) -> Self {
        Self::CreateView {
            schema: schema.into(),
            name: name.into(),
            select,
            if_not_exists: true,
        }
    }

    /// Drop a view in `schema` if it exists.
    pub fn drop_view(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DropView {
            schema: schema.into(),
            name: name.into(),
            if_exists: true,
        }
    }

    /// Arbitrary SQL.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    /// Whether executing this statement changes the schema visible to the
    /// connection.
    pub fn is_schema_change(&self) -> bool {
        matches!(
            self,
            Self::Attach { .. } | Self::Detach { .. } | Self::CreateView { .. } | Self::DropView { .. }
        )
    }

    /// Render the statement.
    pub fn to_sql(&self) -> String {
        match self {
            Self::Attach { path, schema } => {
                format!("ATTACH {} AS {}", quote_literal(path), quote_identifier(schema))
            }
            Self::Detach { schema } => format!("DETACH {}", quote_identifier(schema)),
            Self::CreateView {
                schema,
                name,
                select,
                if_not_exists,
            } => {
                // Unqualified names resolve through temp first, which is what
                // lets a temp view shadow a main table of the same name.
                let temp = if schema == TEMP_SCHEMA { "TEMP " } else { "" };
                let guard = if *if_not_exists { "IF NOT EXISTS " } else { "" };
                format!(
                    "CREATE {}VIEW {}{}.{} AS {}",
                    temp,
                    guard,
                    quote_identifier(schema),
                    quote_identifier(name),
                    select.to_sql()
                )
            }
            Self::DropView {
                schema,
                name,
                if_exists,
            } => format!(
                "DROP VIEW {}{}.{}",
                if *if_exists { "IF EXISTS " } else { "" },
                quote_identifier(schema),
                quote_identifier(name)
            ),
            Self::Begin(mode) => format!("BEGIN {}", mode.as_sql()),
            Self::Commit => "COMMIT".to_string(),
            Self::Rollback => "ROLLBACK".to_string(),
            Self::Raw(sql) => sql.clone(),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}
