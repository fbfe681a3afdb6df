//! Save Feedly collections, feeds, boards and saved items to SQLite.

pub mod auth;
pub mod client;
pub mod db;
pub mod error;
pub mod flatten;
pub mod import;
pub mod logger;

pub use error::{Error, Result};
