use rusqlite::Error as RusqliteError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] RusqliteError),

    #[error("Invalid booking status: '{0}'")]
    InvalidStatus(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Error: {0}")]
    Error(String), // Allows custom application errors
}
