//! Error types for the visit_forecast crate

use count_math::MathError;
use thiserror::Error;

/// Custom error types for the visit_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// The series is too short for the configured lags and history
    #[error("Insufficient data: need {} more days of data (have {available}, require {required})", missing(.required, .available))]
    InsufficientData { required: usize, available: usize },

    /// A forecast was requested for fewer than one day
    #[error("Invalid horizon {0}: horizon must be at least 1")]
    InvalidHorizon(usize),

    /// The backtest could not lay out enough rolling origins
    #[error("Insufficient folds: backtest produced {available} folds, at least {required} required")]
    InsufficientFolds { required: usize, available: usize },

    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error from mathematical operations
    #[error("Math error: {0}")]
    MathError(#[from] MathError),

    /// Error while reading engine configuration
    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),

    /// Error while (de)serializing a model or report
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl ForecastError {
    /// Build an `InsufficientData` error, keeping `required > available`.
    pub fn insufficient(required: usize, available: usize) -> Self {
        ForecastError::InsufficientData {
            required: required.max(available + 1),
            available,
        }
    }

    /// Days still missing before the requirement is met
    pub fn missing_days(&self) -> Option<usize> {
        match self {
            ForecastError::InsufficientData {
                required,
                available,
            } => Some(missing(required, available)),
            _ => None,
        }
    }
}

fn missing(required: &usize, available: &usize) -> usize {
    required.saturating_sub(*available)
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;
