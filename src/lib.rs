pub mod api;
pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod model;
pub mod store;
pub mod telemetry;
pub mod validator;

pub use config::Config;
pub use context::RequestContext;
pub use db::Database;
pub use error::{NewsError, Result};
pub use store::{InMemoryNewsStore, NewsStorer, SqliteNewsStore, StoreError};
