//! Embedded schema migrations.
//!
//! Applied migrations are recorded in `schema_migrations`. Every `up` run is
//! one group, applied in a single transaction; `down` reverts the latest group.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::{NewsError, Result};

pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_news_table",
        up: "CREATE TABLE news (
                id TEXT PRIMARY KEY NOT NULL,
                author TEXT NOT NULL CHECK (author <> ''),
                title TEXT NOT NULL CHECK (title <> ''),
                summary TEXT NOT NULL CHECK (summary <> ''),
                content TEXT NOT NULL CHECK (content <> ''),
                source TEXT NOT NULL CHECK (source <> ''),
                tags TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );",
        down: "DROP TABLE news;",
    },
    Migration {
        version: 2,
        name: "index_live_news",
        up: "CREATE INDEX idx_news_live ON news(deleted_at, created_at);",
        down: "DROP INDEX idx_news_live;",
    },
];

/// Migrations applied (or reverted) together
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationGroup {
    pub id: u32,
    pub migrations: Vec<String>,
}

impl std::fmt::Display for MigrationGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "group #{} ({})", self.id, self.migrations.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub version: u32,
    pub name: String,
    pub group: Option<u32>,
    pub applied_at: Option<String>,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.group.is_some()
    }
}

/// Create the bookkeeping table
pub fn init(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            group_id INTEGER NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn applied_versions(conn: &Connection) -> Result<HashSet<u32>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<HashSet<u32>, _>>()?;
    Ok(versions)
}

fn find(version: u32) -> Result<&'static Migration> {
    MIGRATIONS
        .iter()
        .find(|m| m.version == version)
        .ok_or_else(|| NewsError::Migration(format!("unknown applied migration version {}", version)))
}

/// Apply all pending migrations. Returns `None` when already up to date.
pub fn up(conn: &Connection) -> Result<Option<MigrationGroup>> {
    init(conn)?;
    let applied = applied_versions(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .collect();

    if pending.is_empty() {
        return Ok(None);
    }

    let tx = conn.unchecked_transaction()?;
    let group: u32 = tx.query_row(
        "SELECT COALESCE(MAX(group_id), 0) + 1 FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    let applied_at = Utc::now().to_rfc3339();

    for migration in &pending {
        tx.execute_batch(migration.up).map_err(|e| {
            NewsError::Migration(format!("{} failed: {}", migration.name, e))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, group_id, applied_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![migration.version, migration.name, group, applied_at],
        )?;
    }
    tx.commit()?;

    Ok(Some(MigrationGroup {
        id: group,
        migrations: pending.iter().map(|m| m.name.to_string()).collect(),
    }))
}

/// Revert the latest group. Returns `None` when nothing is applied.
pub fn down(conn: &Connection) -> Result<Option<MigrationGroup>> {
    init(conn)?;
    let group: Option<u32> = conn.query_row(
        "SELECT MAX(group_id) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    let Some(group) = group else {
        return Ok(None);
    };

    let versions = {
        let mut stmt = conn.prepare(
            "SELECT version FROM schema_migrations WHERE group_id = ?1 ORDER BY version DESC",
        )?;
        let versions = stmt
            .query_map([group], |row| row.get(0))?
            .collect::<std::result::Result<Vec<u32>, _>>()?;
        versions
    };

    let tx = conn.unchecked_transaction()?;
    let mut reverted = Vec::with_capacity(versions.len());
    for version in versions {
        let migration = find(version)?;
        tx.execute_batch(migration.down).map_err(|e| {
            NewsError::Migration(format!("rollback of {} failed: {}", migration.name, e))
        })?;
        tx.execute("DELETE FROM schema_migrations WHERE version = ?1", [version])?;
        reverted.push(migration.name.to_string());
    }
    tx.commit()?;

    Ok(Some(MigrationGroup {
        id: group,
        migrations: reverted,
    }))
}

/// Every known migration, applied or not, in version order
pub fn status(conn: &Connection) -> Result<Vec<MigrationStatus>> {
    init(conn)?;
    let mut stmt =
        conn.prepare("SELECT group_id, applied_at FROM schema_migrations WHERE version = ?1")?;

    let mut statuses = Vec::with_capacity(MIGRATIONS.len());
    for migration in MIGRATIONS {
        let applied = stmt
            .query_map([migration.version], |row| {
                Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?))
            })?
            .next()
            .transpose()?;
        statuses.push(MigrationStatus {
            version: migration.version,
            name: migration.name.to_string(),
            group: applied.as_ref().map(|(group, _)| *group),
            applied_at: applied.map(|(_, at)| at),
        });
    }
    Ok(statuses)
}
