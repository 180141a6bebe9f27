//! File I/O error types

use rbe_audio::ProcessError;
use thiserror::Error;

/// Errors raised while reading or writing sound and partial files
#[derive(Error, Debug)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Format error: {0}")]
    Format(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Synthesis error: {0}")]
    Process(#[from] ProcessError),
}

pub type Result<T> = std::result::Result<T, FileError>;
