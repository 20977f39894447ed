//! SQLite connection bootstrap.
//!
//! [`Database`] owns a small fixed pool of connections. Stores hold a cloned
//! handle and never close it.

pub mod migrations;

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use rusqlite::Connection;
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::error::Result;

pub use migrations::{Migration, MigrationGroup, MigrationStatus, MIGRATIONS};

#[derive(Clone)]
pub struct Database {
    pool: Arc<Pool>,
}

struct Pool {
    slots: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl Database {
    /// Open the database described by `config`.
    ///
    /// In-memory databases always get a single connection since every
    /// connection to `:memory:` is a separate database.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if config.is_in_memory() {
            let conn = Connection::open_in_memory()?;
            conn.busy_timeout(config.busy_timeout())?;
            return Ok(Self::from_connections(vec![conn]));
        }

        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut conns = Vec::with_capacity(config.pool_size);
        for _ in 0..config.pool_size.max(1) {
            let conn = Connection::open(&config.path)?;
            conn.busy_timeout(config.busy_timeout())?;
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!(path = %config.path.display(), journal_mode = %mode, "opened connection");
            conns.push(conn);
        }
        Ok(Self::from_connections(conns))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&DatabaseConfig::in_memory())
    }

    fn from_connections(conns: Vec<Connection>) -> Self {
        Self {
            pool: Arc::new(Pool {
                slots: conns.into_iter().map(Mutex::new).collect(),
                next: AtomicUsize::new(0),
            }),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool.slots.len()
    }

    /// Run `f` on a pooled connection, blocking until one is free.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        let conn = self.acquire();
        f(&*conn)
    }

    /// Prefer an idle connection; otherwise wait on the round-robin slot.
    /// A poisoned slot is still usable: rusqlite leaves no partial state behind.
    fn acquire(&self) -> MutexGuard<'_, Connection> {
        let slots = &self.pool.slots;
        let start = self.pool.next.fetch_add(1, Ordering::Relaxed) % slots.len();

        for offset in 0..slots.len() {
            match slots[(start + offset) % slots.len()].try_lock() {
                Ok(guard) => return guard,
                Err(TryLockError::Poisoned(poisoned)) => return poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => continue,
            }
        }

        slots[start].lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply every pending migration
    pub fn migrate_up(&self) -> Result<Option<MigrationGroup>> {
        self.with_conn(migrations::up)
    }

    /// Roll back the most recently applied migration group
    pub fn migrate_down(&self) -> Result<Option<MigrationGroup>> {
        self.with_conn(migrations::down)
    }

    pub fn migration_status(&self) -> Result<Vec<MigrationStatus>> {
        self.with_conn(migrations::status)
    }
}
