use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Auth file absent, unreadable, or without a `developer_token`
    #[error("Cannot find authentication data in {}, please run `feedly-to-sqlite auth`!", .path.display())]
    MissingCredentials { path: PathBuf },

    #[error("Refusing to overwrite {}: {}", .path.display(), .reason)]
    InvalidAuthFile { path: PathBuf, reason: String },

    /// Non-2xx response from the API
    #[error("HTTP error: {status} for {url}")]
    Http { status: StatusCode, url: String },

    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid field map: {0}")]
    FieldMap(String),

    #[error("Row for table '{table}' has no string '{key}' value")]
    MissingPrimaryKey { table: String, key: String },
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::FieldMap(err.to_string())
    }
}
