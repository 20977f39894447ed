use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::api;
use crate::config::Config;
use crate::db::{Database, MigrationStatus};
use crate::error::{NewsError, Result};
use crate::store::SqliteNewsStore;
use crate::telemetry;

/// Options shared by every subcommand
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub database: Option<PathBuf>,
}

impl GlobalOptions {
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(path) = &self.database {
            config.database.path = path.clone();
        }
        Ok(config)
    }

    fn open_database(&self) -> Result<Database> {
        let config = self.load_config()?;
        config.validate()?;
        Database::open(&config.database)
    }
}

pub fn handle_serve(opts: GlobalOptions, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = opts.load_config()?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;

    telemetry::init(&config.log.filter)?;

    let db = Database::open(&config.database)?;
    if config.database.migrate_on_start {
        match db.migrate_up()? {
            Some(group) => info!(%group, "applied migrations"),
            None => info!("schema up to date"),
        }
    }

    let store = Arc::new(SqliteNewsStore::new(db));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| NewsError::Server(format!("failed to start runtime: {}", e)))?;

    runtime.block_on(api::serve(&config.server, store))
}

pub fn handle_migrate_init(opts: GlobalOptions) -> Result<()> {
    let db = opts.open_database()?;
    db.with_conn(crate::db::migrations::init)?;
    println!("migration table created");
    Ok(())
}

pub fn handle_migrate_up(opts: GlobalOptions) -> Result<()> {
    let db = opts.open_database()?;
    match db.migrate_up()? {
        Some(group) => println!("migrated to {}", group),
        None => println!("no new migrations to perform"),
    }
    Ok(())
}

pub fn handle_migrate_down(opts: GlobalOptions) -> Result<()> {
    let db = opts.open_database()?;
    match db.migrate_down()? {
        Some(group) => println!("rolled back {}", group),
        None => println!("no migrations to roll back"),
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusReport<'a> {
    migrations: &'a [MigrationStatus],
    unapplied: Vec<&'a str>,
    last_group: Option<u32>,
}

impl<'a> StatusReport<'a> {
    fn new(migrations: &'a [MigrationStatus]) -> Self {
        Self {
            migrations,
            unapplied: migrations
                .iter()
                .filter(|m| !m.is_applied())
                .map(|m| m.name.as_str())
                .collect(),
            last_group: migrations.iter().filter_map(|m| m.group).max(),
        }
    }
}

pub fn handle_migrate_status(opts: GlobalOptions, json: bool) -> Result<()> {
    let db = opts.open_database()?;
    let statuses = db.migration_status()?;
    let report = StatusReport::new(&statuses);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Migrations:\n");
    for m in &statuses {
        match (&m.group, &m.applied_at) {
            (Some(group), Some(at)) => {
                println!("  {:03} {} (group #{}, applied {})", m.version, m.name, group, at)
            }
            _ => println!("  {:03} {} (pending)", m.version, m.name),
        }
    }
    println!();

    if report.unapplied.is_empty() {
        println!("unapplied migrations: none");
    } else {
        println!("unapplied migrations: {}", report.unapplied.join(", "));
    }
    match report.last_group {
        Some(group) => println!("last group: #{}", group),
        None => println!("last group: none"),
    }
    Ok(())
}
