//! # Visit Forecast
//!
//! Daily visit-count forecasting with a negative-binomial INGARCH model.
//!
//! ## Features
//!
//! - Design matrices with autoregressive lags, calendar indicators and
//!   dense-encoded exogenous signals
//! - Conditional mean and dispersion recursions with a negative-binomial likelihood
//! - Maximum-likelihood fitting with Nelder-Mead, a deterministic retry and an
//!   AR(1) fallback
//! - Multi-step forecasts with prediction bands
//! - Rolling-origin backtests against moving-average, naive and seasonal naive baselines
//!
//! ## Quick Start
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use visit_forecast::{Estimator, FeatureConfig, Forecaster, VisitSeries};
//!
//! # fn main() -> visit_forecast::Result<()> {
//! let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let counts: Vec<u64> = (0..120).map(|d| 100 + (d % 7) * 5).collect();
//! let series = VisitSeries::from_counts(start, &counts)?;
//!
//! let model = Estimator::default().fit(&series, &FeatureConfig::default())?;
//! let forecast = Forecaster::default().forecast(&model, 14, None)?;
//!
//! for point in &forecast {
//!     println!("{} {:.1} [{:.1}, {:.1}]", point.date, point.mean, point.lower, point.upper);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backtest;
pub mod cancel;
pub mod config;
pub mod data;
pub mod error;
pub mod estimator;
pub mod features;
pub mod fitted;
pub mod forecaster;
pub mod models;
pub mod simulate;
pub mod utils;

// Re-export commonly used types
pub use crate::backtest::{
    BacktestEvaluator, BacktestFold, BacktestReport, CoverageGate, MetricSummary, QualityGate,
};
pub use crate::cancel::CancelToken;
pub use crate::config::{
    BacktestConfig, EngineConfig, EstimatorConfig, FeatureConfig, ForecastConfig, WindowKind,
};
pub use crate::data::{ExogRow, ExogValue, Observation, VisitSeries};
pub use crate::error::{ForecastError, Result};
pub use crate::estimator::Estimator;
pub use crate::features::{DesignMatrix, FeatureBuilder, FeatureSchema};
pub use crate::fitted::{FallbackReason, FitDiagnostics, FittedModel};
pub use crate::forecaster::{ForecastPoint, Forecaster};
pub use crate::models::{Baseline, ModelParameters};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
