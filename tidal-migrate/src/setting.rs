//! Shared migration registry.
//!
//! One [`MigrationSetting`] exists per database and is shared by every handle
//! opened on it. Its state sits behind a reader/writer lock that is handed
//! out as-is, so the orchestrator can keep it across a whole database
//! transaction: many handles inspect the state and create views under the
//! read lock, while retiring views and marking tables migrated takes the
//! write lock.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{MigrateResult, MigrationError};
use crate::info::{MigrationInfo, normalize_path};

/// Callback run once for every table whose migration completes.
pub type MigratedCallback = Box<dyn Fn(&MigrationInfo) + Send + Sync>;

/// Key of a target table in the registry. SQLite identifiers are
/// case-insensitive, so `msg` and `MSG` name the same table.
fn table_key(table: &str) -> String {
    table.to_ascii_lowercase()
}

/// Migration state guarded by [`MigrationSetting::shared_lock`].
///
/// Table arguments are matched case-insensitively.
#[derive(Debug, Default)]
pub struct MigrationState {
    /// Keyed by `table_key`.
    infos: HashMap<String, Arc<MigrationInfo>>,
    /// Target names as registered.
    migrated_tables: BTreeSet<String>,
    schemas_for_attaching: HashMap<String, String>,
}

impl MigrationState {
    fn new(infos: HashMap<String, Arc<MigrationInfo>>) -> Self {
        let mut state = Self {
            infos,
            migrated_tables: BTreeSet::new(),
            schemas_for_attaching: HashMap::new(),
        };
        state.refresh_schemas();
        state
    }

    /// Rebuild the attach map from the still-pending infos.
    fn refresh_schemas(&mut self) {
        self.schemas_for_attaching = self
            .infos
            .values()
            .filter(|info| !self.migrated_tables.contains(info.target_table()))
            .filter_map(|info| {
                info.source_path_str()
                    .map(|path| (info.source_schema().to_string(), path.to_string()))
            })
            .collect();
    }

    /// Infos whose migration has not completed, in no particular order.
    pub fn infos(&self) -> impl Iterator<Item = &Arc<MigrationInfo>> {
        self.infos
            .values()
            .filter(|info| !self.migrated_tables.contains(info.target_table()))
    }

    /// Infos whose migration has completed.
    pub fn migrated_infos(&self) -> impl Iterator<Item = &Arc<MigrationInfo>> {
        self.infos
            .values()
            .filter(|info| self.migrated_tables.contains(info.target_table()))
    }

    /// Look up the info of a target table, migrated or not.
    pub fn info(&self, table: &str) -> Option<&Arc<MigrationInfo>> {
        self.infos.get(&table_key(table))
    }

    /// Schema name to source database path, for every source database a
    /// pending migration still reads from.
    pub fn schemas_for_attaching(&self) -> &HashMap<String, String> {
        &self.schemas_for_attaching
    }

    /// Target tables whose migration has completed.
    pub fn migrated_tables(&self) -> &BTreeSet<String> {
        &self.migrated_tables
    }

    /// Target tables still migrating, sorted.
    pub fn pending_tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = self.infos().map(|info| info.target_table()).collect();
        tables.sort_unstable();
        tables
    }

    /// Whether `table` has been migrated.
    pub fn is_migrated(&self, table: &str) -> bool {
        self.info(table)
            .is_some_and(|info| self.migrated_tables.contains(info.target_table()))
    }

    /// Whether every registered table has been migrated.
    pub fn is_all_migrated(&self) -> bool {
        self.migrated_tables.len() == self.infos.len()
    }

    /// Mark `table` as migrated.
    ///
    /// Returns `true` only for the call that performed the transition;
    /// unknown and already-migrated tables return `false`.
    pub fn mark_as_migrated(&mut self, table: &str) -> bool {
        let Some(target) = self.info(table).map(|info| info.target_table().to_string()) else {
            return false;
        };
        if !self.migrated_tables.insert(target) {
            return false;
        }

        let before = self.schemas_for_attaching.len();
        self.refresh_schemas();
        info!(
            table = %table,
            released_schemas = before - self.schemas_for_attaching.len(),
            "Table migrated"
        );
        true
    }
}

/// The migration registry of one database.
pub struct MigrationSetting {
    lock: RwLock<MigrationState>,
    on_migrated: Option<MigratedCallback>,
}

impl MigrationSetting {
    /// Start building a setting for the database at `main_path`.
    pub fn builder(main_path: impl AsRef<Path>) -> MigrationSettingBuilder {
        MigrationSettingBuilder::new(main_path)
    }

    /// The lock guarding the migration state.
    ///
    /// Hold the read lock while inspecting the state or creating views and
    /// the write lock while retiring views and marking tables migrated. The
    /// lock may be kept across several statements.
    pub fn shared_lock(&self) -> &RwLock<MigrationState> {
        &self.lock
    }

    /// Whether `table` has been migrated. Takes the read lock.
    pub fn is_migrated(&self, table: &str) -> bool {
        self.lock.read().is_migrated(table)
    }

    /// Whether every table has been migrated. Takes the read lock.
    pub fn is_all_migrated(&self) -> bool {
        self.lock.read().is_all_migrated()
    }

    /// Target tables still migrating. Takes the read lock.
    pub fn pending_tables(&self) -> Vec<String> {
        self.lock
            .read()
            .pending_tables()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub(crate) fn notify_migrated(&self, info: &MigrationInfo) {
        if let Some(callback) = &self.on_migrated {
            callback(info);
        }
    }
}

impl fmt::Debug for MigrationSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("MigrationSetting");
        // The formatting thread may hold the write guard itself.
        match self.lock.try_read() {
            Some(state) => debug.field("state", &*state),
            None => debug.field("state", &format_args!("<locked>")),
        };
        debug
            .field("on_migrated", &self.on_migrated.is_some())
            .finish()
    }
}

/// Builder for [`MigrationSetting`].
pub struct MigrationSettingBuilder {
    main_path: PathBuf,
    infos: HashMap<String, Arc<MigrationInfo>>,
    on_migrated: Option<MigratedCallback>,
}

impl MigrationSettingBuilder {
    /// Create a builder for the database at `main_path`.
    pub fn new(main_path: impl AsRef<Path>) -> Self {
        Self {
            main_path: normalize_path(main_path.as_ref()),
            infos: HashMap::new(),
            on_migrated: None,
        }
    }

    /// Migrate `source_table` of the main database into `target_table`.
    pub fn table(
        self,
        target_table: impl Into<String>,
        source_table: impl Into<String>,
    ) -> MigrateResult<Self> {
        self.info(MigrationInfo::new(target_table, source_table)?)
    }

    /// Migrate `source_table` of the database at `source_path` into
    /// `target_table`. A source path naming the main database is treated
    /// like [`table`](Self::table).
    pub fn table_from(
        self,
        target_table: impl Into<String>,
        source_table: impl Into<String>,
        source_path: impl AsRef<Path>,
    ) -> MigrateResult<Self> {
        let info = if normalize_path(source_path.as_ref()) == self.main_path {
            MigrationInfo::new(target_table, source_table)?
        } else {
            MigrationInfo::with_source_database(target_table, source_table, source_path)?
        };
        self.info(info)
    }

    /// Register a prepared descriptor.
    pub fn info(mut self, info: MigrationInfo) -> MigrateResult<Self> {
        if let Some(path) = info.source_path() {
            if path == self.main_path {
                return Err(MigrationError::invalid_info(
                    info.target_table(),
                    "source database is the main database; use a same-database migration",
                ));
            }
        }

        let key = table_key(info.target_table());
        if let Some(existing) = self.infos.get(&key) {
            return Err(MigrationError::DuplicateTarget(
                existing.target_table().to_string(),
            ));
        }
        debug!(
            target = %info.target_table(),
            source = %info.source_table(),
            schema = %info.source_schema(),
            "Registered table migration"
        );
        self.infos.insert(key, Arc::new(info));
        Ok(self)
    }

    /// Run `callback` once for every table whose migration completes.
    ///
    /// The callback runs without the migration lock held.
    pub fn on_migrated(mut self, callback: impl Fn(&MigrationInfo) + Send + Sync + 'static) -> Self {
        self.on_migrated = Some(Box::new(callback));
        self
    }

    /// Build the setting.
    pub fn build(self) -> MigrationSetting {
        MigrationSetting {
            lock: RwLock::new(MigrationState::new(self.infos)),
            on_migrated: self.on_migrated,
        }
    }
}
