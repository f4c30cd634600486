//! Handle configuration.
//!
//! A [`SqliteConfig`] names the main database and the pragmas every handle
//! gets when it is activated. It is normally built in code, or parsed from
//! a URL such as `sqlite://data/app.db?journal_mode=wal&busy_timeout=2000`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{SqliteError, SqliteResult};
use crate::statement::Statement;

/// Location of the main database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DatabasePath {
    /// A private in-memory database, one per handle.
    #[default]
    Memory,
    /// A database file.
    File(PathBuf),
}

impl DatabasePath {
    /// The file path, or `None` for an in-memory database.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Memory => None,
            Self::File(path) => Some(path),
        }
    }

    /// Whether handles get a private in-memory database.
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl fmt::Display for DatabasePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str(":memory:"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// `PRAGMA synchronous` setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SynchronousMode {
    /// No syncs.
    Off,
    /// Sync at critical moments; safe with WAL.
    #[default]
    Normal,
    /// Sync on every commit.
    Full,
}

impl SynchronousMode {
    fn keyword(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
        }
    }
}

impl FromStr for SynchronousMode {
    type Err = SqliteError;

    fn from_str(value: &str) -> SqliteResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "off" | "0" => Ok(Self::Off),
            "normal" | "1" => Ok(Self::Normal),
            "full" | "2" => Ok(Self::Full),
            _ => Err(SqliteError::config(format!(
                "unknown synchronous mode '{}'",
                value
            ))),
        }
    }
}

/// `PRAGMA journal_mode` setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JournalMode {
    /// Rollback journal deleted after each transaction.
    Delete,
    /// Rollback journal truncated after each transaction.
    Truncate,
    /// Rollback journal kept in memory.
    Memory,
    /// Write-ahead log. Readers do not block the writer.
    #[default]
    Wal,
}

impl JournalMode {
    fn keyword(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
        }
    }
}

impl FromStr for JournalMode {
    type Err = SqliteError;

    fn from_str(value: &str) -> SqliteResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "delete" => Ok(Self::Delete),
            "truncate" => Ok(Self::Truncate),
            "memory" => Ok(Self::Memory),
            "wal" => Ok(Self::Wal),
            _ => Err(SqliteError::config(format!(
                "unknown journal mode '{}'",
                value
            ))),
        }
    }
}

/// How handles on one database are opened and activated.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Main database.
    pub path: DatabasePath,
    /// `PRAGMA foreign_keys`.
    pub foreign_keys: bool,
    /// `PRAGMA busy_timeout`, in milliseconds.
    pub busy_timeout_ms: Option<u32>,
    /// `PRAGMA cache_size`: pages when positive, KiB when negative.
    pub cache_size: Option<i32>,
    /// `PRAGMA synchronous`.
    pub synchronous: SynchronousMode,
    /// `PRAGMA journal_mode`. Ignored for in-memory databases.
    pub journal_mode: JournalMode,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: DatabasePath::Memory,
            foreign_keys: true,
            busy_timeout_ms: Some(5000),
            cache_size: None,
            synchronous: SynchronousMode::Normal,
            journal_mode: JournalMode::Wal,
        }
    }
}

impl SqliteConfig {
    /// Configuration for private in-memory databases.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Configuration for the database file at `path`.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: DatabasePath::File(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Parse a database URL.
    ///
    /// Accepts `sqlite::memory:`, `:memory:`, `sqlite://<path>`,
    /// `sqlite:<path>`, `file:<path>` and bare paths, followed by optional
    /// `?key=value&...` parameters: `foreign_keys`, `busy_timeout`,
    /// `cache_size`, `synchronous`, `journal_mode` and `mode=memory`.
    /// Unknown keys are ignored; malformed values are errors.
    pub fn from_url(url: impl AsRef<str>) -> SqliteResult<Self> {
        let url = url.as_ref();
        let (location, query) = url.split_once('?').unwrap_or((url, ""));

        let path = ["sqlite://", "sqlite:", "file:"]
            .iter()
            .find_map(|scheme| location.strip_prefix(scheme))
            .unwrap_or(location);

        let mut config = match path {
            "" => return Err(SqliteError::config("database path is required")),
            ":memory:" => Self::memory(),
            path => Self::file(path),
        };

        for (key, value) in query.split('&').filter_map(|pair| pair.split_once('=')) {
            match key {
                "mode" if value == "memory" => config.path = DatabasePath::Memory,
                "foreign_keys" => config.foreign_keys = parse_flag(key, value)?,
                "busy_timeout" => config.busy_timeout_ms = Some(parse_number(key, value)?),
                "cache_size" => config.cache_size = Some(parse_number(key, value)?),
                "synchronous" => config.synchronous = value.parse()?,
                "journal_mode" => config.journal_mode = value.parse()?,
                _ => {}
            }
        }
        Ok(config)
    }

    /// The pragmas applied to every handle when it is activated.
    pub fn pragmas(&self) -> Statement {
        let mut pragmas = Vec::new();

        // First, so the journal mode switch waits on a busy database.
        if let Some(ms) = self.busy_timeout_ms {
            pragmas.push(format!("busy_timeout = {}", ms));
        }
        pragmas.push(format!(
            "foreign_keys = {}",
            if self.foreign_keys { "ON" } else { "OFF" }
        ));
        if !self.path.is_memory() {
            pragmas.push(format!("journal_mode = {}", self.journal_mode.keyword()));
        }
        pragmas.push(format!("synchronous = {}", self.synchronous.keyword()));
        if let Some(size) = self.cache_size {
            pragmas.push(format!("cache_size = {}", size));
        }

        let sql: Vec<String> = pragmas
            .into_iter()
            .map(|pragma| format!("PRAGMA {};", pragma))
            .collect();
        Statement::raw(sql.join("\n"))
    }

    /// Set the main database.
    pub fn path(mut self, path: DatabasePath) -> Self {
        self.path = path;
        self
    }

    /// Enable or disable foreign key enforcement.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Set how long a handle waits on a locked database, in milliseconds.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = Some(ms);
        self
    }

    /// Set the page cache size.
    pub fn cache_size(mut self, size: i32) -> Self {
        self.cache_size = Some(size);
        self
    }

    /// Set the synchronous mode.
    pub fn synchronous(mut self, mode: SynchronousMode) -> Self {
        self.synchronous = mode;
        self
    }

    /// Set the journal mode.
    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }
}

fn parse_flag(key: &str, value: &str) -> SqliteResult<bool> {
    match value {
        "true" | "1" | "on" => Ok(true),
        "false" | "0" | "off" => Ok(false),
        _ => Err(SqliteError::config(format!("invalid {} '{}'", key, value))),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> SqliteResult<T> {
    value
        .parse()
        .map_err(|_| SqliteError::config(format!("invalid {} '{}'", key, value)))
}
