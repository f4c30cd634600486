//! SQLite handles for Tidal.
//!
//! This crate provides the connection layer the migration engine runs on,
//! built on `rusqlite`.
//!
//! # Features
//!
//! - A [`Handle`] trait describing what setup stages may do to a connection
//! - [`SqliteHandle`], the `rusqlite` implementation
//! - An ordered handle setup pipeline ([`Configs`], [`HandleConfig`])
//! - A pool that activates handles before serving them ([`HandlePool`])
//! - A small statement builder for the statements the pipeline issues
//!
//! # Example
//!
//! ```rust,ignore
//! use tidal_sqlite::{BasicConfig, Configs, HandlePool, SqliteConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SqliteConfig::from_url("sqlite://./mydb.db")?;
//!     let configs = Configs::new().with(BasicConfig::new(config.clone()))?;
//!     let pool = HandlePool::new(config, configs);
//!
//!     let handle = pool.get()?;
//!     let count: i64 = handle.query_scalar("SELECT count(*) FROM sqlite_master")?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod handle;
pub mod pool;
pub mod setup;
pub mod statement;

pub use config::{DatabasePath, JournalMode, SqliteConfig, SynchronousMode};
pub use error::{SqliteError, SqliteResult};
pub use handle::{AttachedSchema, Handle, HandleStats, SchemaOrigin, SqliteHandle};
pub use pool::{HandlePool, PoolConfig, PoolStats, PooledHandle};
pub use setup::{BasicConfig, ConfigOrder, Configs, HandleConfig, SharedConfig};
pub use statement::{MAIN_SCHEMA, Select, Statement, TEMP_SCHEMA, TransactionMode};
