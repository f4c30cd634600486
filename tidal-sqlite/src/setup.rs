//! Handle setup pipeline.
//!
//! Every handle is activated by running a fixed sequence of stages before it
//! is handed to application code. Each stage implements [`HandleConfig`] and
//! occupies one slot of the total order [`ConfigOrder`]; a stage may rely on
//! every earlier slot having prepared the connection (decryption must happen
//! before anything reads the schema, for instance).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::SqliteConfig;
use crate::error::{SqliteError, SqliteResult};
use crate::handle::Handle;

/// Slots of the setup pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ConfigOrder {
    /// Statement tracing.
    Trace = 0,
    /// Connection pragmas.
    Basic = 1,
    /// Encryption keys.
    Cipher = 2,
    /// Full-text tokenizers.
    Tokenize = 3,
    /// Online table migration.
    Migration = 4,
    /// Checkpoint tuning.
    Checkpoint = 5,
}

impl ConfigOrder {
    /// Position of the slot in the pipeline.
    pub const fn rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ConfigOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trace => "trace",
            Self::Basic => "basic",
            Self::Cipher => "cipher",
            Self::Tokenize => "tokenize",
            Self::Migration => "migration",
            Self::Checkpoint => "checkpoint",
        };
        f.write_str(name)
    }
}

/// A stage of the handle setup pipeline.
pub trait HandleConfig: Send + Sync {
    /// Unique name of this stage.
    fn name(&self) -> &str;

    /// The slot this stage occupies.
    fn order(&self) -> ConfigOrder;

    /// Prepare `handle`. An error fails the whole activation.
    fn invoke(&self, handle: &mut dyn Handle) -> SqliteResult<()>;
}

/// A stage that can be shared across pools and threads.
pub type SharedConfig = Arc<dyn HandleConfig>;

/// The ordered set of setup stages.
#[derive(Clone, Default)]
pub struct Configs {
    stages: BTreeMap<ConfigOrder, SharedConfig>,
}

impl Configs {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage (builder pattern).
    pub fn with<C: HandleConfig + 'static>(mut self, config: C) -> SqliteResult<Self> {
        self.insert(Arc::new(config))?;
        Ok(self)
    }

    /// Add a stage.
    ///
    /// A stage with the same name replaces the previous one. A stage with a
    /// different name in an occupied slot is rejected.
    pub fn insert(&mut self, config: SharedConfig) -> SqliteResult<()> {
        let order = config.order();
        if let Some(existing) = self.stages.get(&order) {
            if existing.name() != config.name() {
                return Err(SqliteError::config(format!(
                    "slot '{}' is already taken by '{}', cannot add '{}'",
                    order,
                    existing.name(),
                    config.name()
                )));
            }
        }

        // A rename into a new slot must not leave the old registration behind.
        self.stages
            .retain(|slot, stage| *slot == order || stage.name() != config.name());

        debug!(name = %config.name(), order = %order, "Registered setup stage");
        self.stages.insert(order, config);
        Ok(())
    }

    /// Remove a stage by name. Returns whether it was registered.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.stages.len();
        self.stages.retain(|_, stage| stage.name() != name);
        before != self.stages.len()
    }

    /// Look up a stage by name.
    pub fn get(&self, name: &str) -> Option<&SharedConfig> {
        self.stages.values().find(|stage| stage.name() == name)
    }

    /// Stage names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.stages.values().map(|stage| stage.name()).collect()
    }

    /// Get the number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if the pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order, stopping at the first failure.
    pub fn invoke(&self, handle: &mut dyn Handle) -> SqliteResult<()> {
        for stage in self.stages.values() {
            stage.invoke(handle).map_err(|err| {
                warn!(stage = %stage.name(), error = %err, "Setup stage failed");
                match err {
                    SqliteError::Activation { .. } => err,
                    other => SqliteError::activation(stage.name(), other.to_string()),
                }
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for Configs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configs")
            .field("stages", &self.names())
            .finish()
    }
}

/// Applies the pragmas of a [`SqliteConfig`].
#[derive(Debug, Clone)]
pub struct BasicConfig {
    config: SqliteConfig,
}

impl BasicConfig {
    /// Stage name.
    pub const NAME: &'static str = "basic";

    /// Create the stage.
    pub fn new(config: SqliteConfig) -> Self {
        Self { config }
    }
}

impl HandleConfig for BasicConfig {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn order(&self) -> ConfigOrder {
        ConfigOrder::Basic
    }

    fn invoke(&self, handle: &mut dyn Handle) -> SqliteResult<()> {
        handle.execute(&self.config.pragmas())
    }
}
