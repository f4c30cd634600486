//! Handle pool.
//!
//! Handles are expensive to open and carry per-connection state (attached
//! schemas, temp views), so the pool keeps idle handles around and reuses
//! them. Every handle leaving the pool is activated first: the setup
//! pipeline runs on it, and a handle whose activation fails is discarded
//! instead of being served.
//!
//! In-memory databases are never pooled, since every connection to
//! `:memory:` opens a separate database.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::config::SqliteConfig;
use crate::error::{SqliteError, SqliteResult};
use crate::handle::SqliteHandle;
use crate::setup::{Configs, SharedConfig};

/// An idle handle waiting in the pool.
struct IdleHandle {
    handle: SqliteHandle,
    created_at: Instant,
    last_used: Instant,
}

struct PoolInner {
    config: SqliteConfig,
    pool_config: PoolConfig,
    configs: RwLock<Configs>,
    idle: Mutex<VecDeque<IdleHandle>>,
    stats: Mutex<PoolStats>,
}

/// A pool of activated SQLite handles.
///
/// # Example
///
/// ```rust,ignore
/// use tidal_sqlite::{BasicConfig, Configs, HandlePool, SqliteConfig};
///
/// let config = SqliteConfig::file("data.db");
/// let configs = Configs::new().with(BasicConfig::new(config.clone()))?;
/// let pool = HandlePool::new(config, configs);
/// let handle = pool.get()?;
/// // Use handle...
/// // Handle is returned to the pool when dropped
/// ```
#[derive(Clone)]
pub struct HandlePool {
    inner: Arc<PoolInner>,
}

/// Statistics about pool usage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of handle reuses.
    pub reuses: u64,
    /// Number of new handles opened.
    pub opens: u64,
    /// Number of handles closed due to expiration.
    pub expirations: u64,
    /// Number of successful activations.
    pub activations: u64,
    /// Number of activations that failed.
    pub failed_activations: u64,
    /// Number of handles currently in use.
    pub in_use: usize,
}

/// Configuration for the handle pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of idle handles kept for reuse.
    pub max_idle: usize,
    /// Maximum idle time before a handle is closed.
    pub idle_timeout: Option<Duration>,
    /// Maximum lifetime of a handle before it's recycled.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 5, // SQLite benefits from fewer connections
            idle_timeout: Some(Duration::from_secs(300)),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

impl PoolConfig {
    /// Set the maximum number of idle handles.
    pub fn max_idle(mut self, n: usize) -> Self {
        self.max_idle = n;
        self
    }

    /// Set the idle timeout.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum handle lifetime.
    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }
}

impl HandlePool {
    /// Create a pool with the default pool configuration.
    pub fn new(config: SqliteConfig, configs: Configs) -> Self {
        Self::with_pool_config(config, configs, PoolConfig::default())
    }

    /// Create a pool with a custom pool configuration.
    pub fn with_pool_config(config: SqliteConfig, configs: Configs, pool_config: PoolConfig) -> Self {
        info!(
            path = %config.path,
            max_idle = %pool_config.max_idle,
            stages = ?configs.names(),
            "SQLite handle pool created"
        );

        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(VecDeque::with_capacity(pool_config.max_idle)),
                config,
                pool_config,
                configs: RwLock::new(configs),
                stats: Mutex::new(PoolStats::default()),
            }),
        }
    }

    /// Get an activated handle.
    ///
    /// An idle handle is reused when one is available; otherwise a new one is
    /// opened. Either way the setup pipeline runs before the handle is
    /// returned.
    pub fn get(&self) -> SqliteResult<PooledHandle> {
        trace!("Acquiring handle from pool");

        let (mut handle, created_at) = match self.take_idle() {
            Some(idle) => (idle.handle, idle.created_at),
            None => {
                debug!("No idle handles, opening new handle");
                let handle = SqliteHandle::open(&self.inner.config)?;
                self.inner.stats.lock().opens += 1;
                (handle, Instant::now())
            }
        };

        // Snapshot the pipeline so a concurrent `set_config` never waits on
        // a slow activation.
        let configs = self.inner.configs.read().clone();
        if let Err(err) = configs.invoke(&mut handle) {
            self.inner.stats.lock().failed_activations += 1;
            warn!(error = %err, "Handle activation failed, discarding handle");
            return Err(err);
        }

        {
            let mut stats = self.inner.stats.lock();
            stats.activations += 1;
            stats.in_use += 1;
        }

        Ok(PooledHandle {
            handle: Some(handle),
            created_at,
            pool: self.inner.clone(),
        })
    }

    fn take_idle(&self) -> Option<IdleHandle> {
        if self.inner.config.path.is_memory() {
            return None;
        }

        let mut idle = self.inner.idle.lock();
        while let Some(candidate) = idle.pop_front() {
            let is_expired = self
                .inner
                .pool_config
                .max_lifetime
                .is_some_and(|lifetime| candidate.created_at.elapsed() > lifetime);
            let is_idle_expired = self
                .inner
                .pool_config
                .idle_timeout
                .is_some_and(|timeout| candidate.last_used.elapsed() > timeout);

            if is_expired || is_idle_expired {
                self.inner.stats.lock().expirations += 1;
                continue;
            }

            self.inner.stats.lock().reuses += 1;
            return Some(candidate);
        }
        None
    }

    /// Add or replace a setup stage. Takes effect on the next activation.
    pub fn set_config(&self, config: SharedConfig) -> SqliteResult<()> {
        self.inner.configs.write().insert(config)
    }

    /// Remove a setup stage by name.
    pub fn remove_config(&self, name: &str) -> bool {
        self.inner.configs.write().remove(name)
    }

    /// Names of the setup stages, in execution order.
    pub fn config_names(&self) -> Vec<String> {
        self.inner
            .configs
            .read()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Get the database configuration.
    pub fn config(&self) -> &SqliteConfig {
        &self.inner.config
    }

    /// Get the pool settings.
    pub fn pool_config(&self) -> &PoolConfig {
        &self.inner.pool_config
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.inner.stats.lock().clone()
    }

    /// Get the number of idle handles in the pool.
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }
}

/// An activated handle borrowed from a [`HandlePool`].
///
/// Returned to the pool when dropped.
pub struct PooledHandle {
    handle: Option<SqliteHandle>,
    created_at: Instant,
    pool: Arc<PoolInner>,
}

impl PooledHandle {
    /// Take the handle out of the pool for good.
    pub fn detach(mut self) -> SqliteResult<SqliteHandle> {
        self.pool.stats.lock().in_use -= 1;
        self.handle
            .take()
            .ok_or_else(|| SqliteError::pool("handle already taken"))
    }
}

impl Deref for PooledHandle {
    type Target = SqliteHandle;

    fn deref(&self) -> &SqliteHandle {
        // Only `detach` and `drop` take the handle, and both consume `self`.
        self.handle.as_ref().expect("handle already taken")
    }
}

impl DerefMut for PooledHandle {
    fn deref_mut(&mut self) -> &mut SqliteHandle {
        self.handle.as_mut().expect("handle already taken")
    }
}

impl Drop for PooledHandle {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.pool.stats.lock().in_use -= 1;

        // A handle left inside a transaction by a panicking caller is not
        // safe to reuse.
        if self.pool.config.path.is_memory() || !handle.connection().is_autocommit() {
            return;
        }

        let mut idle = self.pool.idle.lock();
        if idle.len() < self.pool.pool_config.max_idle {
            trace!("Returning handle to pool");
            idle.push_back(IdleHandle {
                handle,
                created_at: self.created_at,
                last_used: Instant::now(),
            });
        }
    }
}
