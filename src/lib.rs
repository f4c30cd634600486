//! # Tidal
//!
//! Online table migration for embedded SQLite databases.
//!
//! Tidal moves rows from source tables, possibly living in other database
//! files, into target tables while the database stays open for reads and
//! writes. Every handle sees the union of migrated and not-yet-migrated rows
//! under the target table's name until the table is done.
//!
//! - [`sqlite`]: handles, the ordered handle setup pipeline and the pool
//! - [`migrate`]: the migration registry and the setup stage driving it
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tidal::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let setting = Arc::new(
//!         MigrationSetting::builder("app.db")
//!             .table_from("message", "message", "legacy.db")?
//!             .build(),
//!     );
//!
//!     let config = SqliteConfig::file("app.db");
//!     let configs = Configs::new()
//!         .with(BasicConfig::new(config.clone()))?
//!         .with(MigrationConfig::new(setting.clone()))?;
//!     let pool = HandlePool::new(config, configs);
//!
//!     // Sees rows from both legacy.db and app.db.
//!     let handle = pool.get()?;
//!     let count: i64 = handle.query_scalar("SELECT count(*) FROM message")?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// SQLite handles and the handle setup pipeline.
pub mod sqlite {
    pub use tidal_sqlite::*;
}

/// The online migration engine.
pub mod migrate {
    pub use tidal_migrate::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::migrate::{MigrationConfig, MigrationError, MigrationInfo, MigrationSetting};
    pub use crate::sqlite::{
        BasicConfig, Configs, Handle, HandleConfig, HandlePool, SqliteConfig, SqliteError,
        SqliteHandle, Statement,
    };
}

// Re-export key types at the crate root
pub use migrate::{MigrationConfig, MigrationSetting};
pub use sqlite::{HandlePool, SqliteError};
