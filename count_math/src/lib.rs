//! # Count Math
//!
//! Numerical building blocks for count time-series models.
//! This crate provides the pieces the forecasting engine is assembled from:
//! summary statistics, the negative-binomial likelihood, positivity-preserving
//! transforms, moving averages and forecast accuracy scores.

use thiserror::Error;

pub mod accuracy;
pub mod distributions;
pub mod moving_averages;
pub mod stats;
pub mod transforms;

/// Errors that can occur in count-model calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for count math operations
pub type Result<T> = std::result::Result<T, MathError>;

pub use accuracy::{forecast_accuracy, ForecastAccuracy};
pub use distributions::{nb_log_pmf, nb_variance, DISPERSION_FLOOR, MEAN_FLOOR};
pub use transforms::{safe_softplus, safe_softplus_inv};
