//! Processing and synthesis error types

use rbe_model::ModelError;
use thiserror::Error;

/// Errors raised by partial processing and synthesis
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Partials must be distilled before morphing (label {0} appears twice)")]
    NotDistilled(i32),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, ProcessError>;
