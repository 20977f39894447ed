mod commands;
mod handlers;

pub use commands::{Cli, Commands, MigrateAction, MigrateCommand};
pub use handlers::{
    handle_migrate_down, handle_migrate_init, handle_migrate_status, handle_migrate_up,
    handle_serve, GlobalOptions,
};
