use clap::Parser;
use news_api::cli::{
    handle_migrate_down, handle_migrate_init, handle_migrate_status, handle_migrate_up,
    handle_serve, Cli, Commands, GlobalOptions, MigrateAction,
};

fn main() {
    let cli = Cli::parse();
    let opts = GlobalOptions {
        config: cli.config,
        database: cli.database,
    };

    let result = match cli.command {
        Commands::Serve { host, port } => handle_serve(opts, host, port),
        Commands::Migrate(migrate) => match migrate.action {
            MigrateAction::Init => handle_migrate_init(opts),
            MigrateAction::Up => handle_migrate_up(opts),
            MigrateAction::Down => handle_migrate_down(opts),
            MigrateAction::Status { json } => handle_migrate_status(opts, json),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
