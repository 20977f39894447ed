use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "news-api")]
#[command(version, about = "A CRUD REST service for news articles")]
#[command(propagate_version = true)]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, short = 'c', global = true, env = "NEWS_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// SQLite database file, overrides the configured path
    #[arg(long, global = true, env = "NEWS_DATABASE_PATH", value_name = "PATH")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to listen on
        #[arg(long, env = "NEWS_HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(long, short = 'p', env = "NEWS_PORT")]
        port: Option<u16>,
    },

    /// Manage the database schema
    Migrate(MigrateCommand),
}

#[derive(Args, Debug)]
pub struct MigrateCommand {
    #[command(subcommand)]
    pub action: MigrateAction,
}

#[derive(Subcommand, Debug)]
pub enum MigrateAction {
    /// Create the migration bookkeeping table
    Init,

    /// Apply all pending migrations
    Up,

    /// Roll back the last migration group
    Down,

    /// Show applied and pending migrations
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
