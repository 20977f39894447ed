use thiserror::Error;

#[derive(Error, Debug)]
pub enum NewsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<rusqlite::Error> for NewsError {
    fn from(e: rusqlite::Error) -> Self {
        NewsError::Database(format!("SQLite error: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, NewsError>;
