//! Errors raised by model operations

use thiserror::Error;

/// Errors that can occur when manipulating partials and envelopes
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid partial: {0}")]
    InvalidPartial(String),
}
