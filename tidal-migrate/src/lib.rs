//! # tidal-migrate
//!
//! Online table migration for Tidal.
//!
//! Rows move from source tables (in the main database or in other database
//! files) into target tables while the database stays open. Until a table
//! is fully migrated, every handle sees a temp view under the target name
//! that unions the rows still in the source with the rows already moved.
//! Once the source table is gone the view is retired and the name refers to
//! the physical table again.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   read/write lock   ┌──────────────────┐
//! │ MigrationSetting │◀────────────────────│ MigrationConfig  │
//! │  infos           │                     │  attach_schemas  │
//! │  migrated tables │                     │  create_views    │
//! │  schemas to      │                     └────────┬─────────┘
//! │  attach          │                              │ invoke
//! └──────────────────┘                              ▼
//!                                          ┌──────────────────┐
//!                                          │ Handle (per      │
//!                                          │ thread)          │
//!                                          └──────────────────┘
//! ```
//!
//! Copying rows is not this crate's job: the row-copy driver moves rows in
//! batches, keeps source and target disjoint, and drops the source table
//! once it is empty. The engine makes the schema consistent around those
//! batches and finalizes a table when its source disappears.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tidal_migrate::{MigrationConfig, MigrationSetting};
//! use tidal_sqlite::{BasicConfig, Configs, HandlePool, SqliteConfig};
//!
//! fn open() -> Result<HandlePool, Box<dyn std::error::Error>> {
//!     let setting = Arc::new(
//!         MigrationSetting::builder("app.db")
//!             .table("message", "message_v1")?
//!             .table_from("contact", "contact", "legacy.db")?
//!             .on_migrated(|info| println!("{} migrated", info.target_table()))
//!             .build(),
//!     );
//!
//!     let config = SqliteConfig::file("app.db");
//!     let configs = Configs::new()
//!         .with(BasicConfig::new(config.clone()))?
//!         .with(MigrationConfig::new(setting))?;
//!     Ok(HandlePool::new(config, configs))
//! }
//! ```

pub mod config;
pub mod error;
pub mod info;
pub mod setting;

// Re-exports
pub use config::MigrationConfig;
pub use error::{MigrateResult, MigrationError};
pub use info::{MigrationInfo, SCHEMA_PREFIX, normalize_path, schema_name_for};
pub use setting::{MigratedCallback, MigrationSetting, MigrationSettingBuilder, MigrationState};
