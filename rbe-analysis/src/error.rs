//! Analysis error types

use rbe_model::ModelError;
use thiserror::Error;

/// Errors that can occur while configuring or running analysis
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("No partial qualifies as a frequency reference in {min_freq}-{max_freq} Hz")]
    NoReferencePartial { min_freq: f64, max_freq: f64 },
    #[error("No reliable fundamental estimate in {min_freq}-{max_freq} Hz")]
    NoFundamental { min_freq: f64, max_freq: f64 },
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
