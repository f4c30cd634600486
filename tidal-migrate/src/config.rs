//! The migration setup stage.
//!
//! [`MigrationConfig`] runs on every handle before application code gets to
//! it. It brings the handle in line with the shared [`MigrationSetting`]:
//!
//! 1. attach every source database a pending migration reads from and
//!    detach the ones the engine attached earlier but no longer needs;
//! 2. under the read lock, create the unioned view of every table whose
//!    source still exists and collect the tables whose source is gone;
//! 3. under the write lock, drop the views of the collected tables and mark
//!    them migrated, in one transaction;
//! 4. if step 3 retired any view, reconcile attachments once more.

use std::sync::Arc;

use tidal_sqlite::{ConfigOrder, Handle, HandleConfig, SchemaOrigin, SqliteResult, TEMP_SCHEMA};
use tracing::{debug, instrument, warn};

use crate::info::MigrationInfo;
use crate::setting::MigrationSetting;

// Migration reads the schema, so every stage preparing the connection must
// have run first.
const _: () = assert!(ConfigOrder::Migration.rank() > ConfigOrder::Trace.rank());
const _: () = assert!(ConfigOrder::Migration.rank() > ConfigOrder::Basic.rank());
const _: () = assert!(ConfigOrder::Migration.rank() > ConfigOrder::Cipher.rank());
const _: () = assert!(ConfigOrder::Migration.rank() > ConfigOrder::Tokenize.rank());

/// Setup stage keeping a handle consistent with an ongoing migration.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    setting: Arc<MigrationSetting>,
}

impl MigrationConfig {
    /// Stage name.
    pub const NAME: &'static str = "migration";

    /// Create the stage for `setting`.
    pub fn new(setting: Arc<MigrationSetting>) -> Self {
        Self { setting }
    }

    /// The registry this stage reads from.
    pub fn setting(&self) -> &Arc<MigrationSetting> {
        &self.setting
    }

    /// Attach the source databases pending migrations need and detach the
    /// engine's schemas that are no longer needed.
    ///
    /// Schemas the application attached are left alone.
    #[instrument(skip_all)]
    pub fn attach_schemas(&self, handle: &mut dyn Handle) -> SqliteResult<()> {
        let state = self.setting.shared_lock().read();
        let mut to_detach = handle.attached_schemas()?;

        for (schema, path) in state.schemas_for_attaching() {
            if to_detach.remove(schema).is_some() {
                continue;
            }
            debug!(schema = %schema, path = %path, "Attaching source database");
            handle.attach(path, schema, SchemaOrigin::Migration)?;
        }

        for (schema, attached) in &to_detach {
            if attached.origin != SchemaOrigin::Migration {
                continue;
            }
            debug!(schema = %schema, "Detaching unneeded source database");
            handle.detach(schema)?;
        }
        Ok(())
    }

    /// Create the unioned views of tables still migrating and retire the
    /// views of tables whose source is gone.
    ///
    /// Returns whether views were retired. The attach set may have shrunk
    /// then, whichever handle marked the tables migrated.
    #[instrument(skip_all)]
    pub fn create_views(&self, handle: &mut dyn Handle) -> SqliteResult<bool> {
        let mut finished: Vec<Arc<MigrationInfo>> = Vec::new();
        {
            let state = self.setting.shared_lock().read();
            handle.run_transaction(&mut |handle| {
                finished.clear();
                for info in state.infos() {
                    if !handle.table_exists(info.source_schema(), info.source_table())? {
                        finished.push(info.clone());
                        continue;
                    }
                    if !handle.view_exists(TEMP_SCHEMA, info.target_table())? {
                        debug!(table = %info.target_table(), "Creating unioned view");
                        handle.execute(&info.statement_for_creating_unioned_view())?;
                    }
                }
                // Another handle may have finished a table while this one
                // still carries its view.
                for info in state.migrated_infos() {
                    if handle.view_exists(TEMP_SCHEMA, info.target_table())? {
                        finished.push(info.clone());
                    }
                }
                Ok(())
            })?;
        }

        if finished.is_empty() {
            return Ok(false);
        }

        let mut migrated = Vec::new();
        {
            let mut state = self.setting.shared_lock().write();
            handle.run_transaction(&mut |handle| {
                for info in &finished {
                    debug!(table = %info.target_table(), "Dropping unioned view");
                    handle.execute(&info.statement_for_dropping_unioned_view())?;
                }
                Ok(())
            })?;

            for info in &finished {
                if state.mark_as_migrated(info.target_table()) {
                    migrated.push(info.clone());
                }
            }
        }

        for info in &migrated {
            self.setting.notify_migrated(info);
        }
        Ok(true)
    }
}

impl HandleConfig for MigrationConfig {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn order(&self) -> ConfigOrder {
        ConfigOrder::Migration
    }

    fn invoke(&self, handle: &mut dyn Handle) -> SqliteResult<()> {
        self.attach_schemas(handle)?;
        let schema_changed = self.create_views(handle).inspect_err(|err| {
            warn!(error = %err, "View reconciliation failed");
        })?;
        if schema_changed {
            self.attach_schemas(handle)?;
        }
        Ok(())
    }
}
