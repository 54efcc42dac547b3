//! Engine configuration
//!
//! Every section deserializes with defaults filled in, so an empty TOML
//! document yields the documented defaults.

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Feature construction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Autoregressive lags in days
    pub lags: Vec<usize>,
    /// Exogenous columns to encode, in order
    pub exogenous: Vec<String>,
    /// Observations required on top of the largest lag
    pub min_history: usize,
    /// Emit an `is_weekend` indicator
    pub weekend: bool,
    /// Emit six day-of-week dummies with Monday as baseline
    pub day_of_week: bool,
    /// Holiday calendar; an `is_holiday` column is emitted when non-empty
    pub holidays: Vec<NaiveDate>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lags: vec![1, 7, 14],
            exogenous: Vec::new(),
            min_history: 30,
            weekend: true,
            day_of_week: false,
            holidays: Vec::new(),
        }
    }
}

impl FeatureConfig {
    /// Largest configured lag
    pub fn max_lag(&self) -> usize {
        self.lags.iter().copied().max().unwrap_or(0)
    }

    /// Smallest series length the feature builder accepts
    pub fn required_observations(&self) -> usize {
        self.max_lag() + self.min_history + 1
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.lags.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "At least one autoregressive lag is required".to_string(),
            ));
        }
        if self.lags.contains(&0) {
            return Err(ForecastError::InvalidParameter(
                "Lags must be at least 1 day".to_string(),
            ));
        }
        let mut sorted = self.lags.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != self.lags.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "Duplicate lags in {:?}",
                self.lags
            )));
        }
        let mut names = self.exogenous.clone();
        names.sort();
        names.dedup();
        if names.len() != self.exogenous.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "Duplicate exogenous columns in {:?}",
                self.exogenous
            )));
        }
        Ok(())
    }
}

/// Maximum-likelihood search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Number of ARCH terms in the dispersion equation
    pub dispersion_order: usize,
    /// Iteration budget per optimizer attempt
    pub max_iters: u64,
    /// Simplex cost standard deviation at which Nelder-Mead stops
    pub sd_tolerance: f64,
    /// Required drop in mean negative log-likelihood versus the initial guess
    pub min_improvement: f64,
    /// Optional wall-clock budget for the whole fit, in milliseconds
    pub time_budget_ms: Option<u64>,
    /// Retry once from a perturbed start when the first attempt fails
    pub retry: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            dispersion_order: 1,
            max_iters: 5_000,
            sd_tolerance: 1e-8,
            min_improvement: 1e-6,
            time_budget_ms: None,
            retry: true,
        }
    }
}

impl EstimatorConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.sd_tolerance.is_finite() && self.sd_tolerance > 0.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "sd_tolerance must be positive, got {}",
                self.sd_tolerance
            )));
        }
        if !(self.min_improvement.is_finite() && self.min_improvement >= 0.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "min_improvement must be non-negative, got {}",
                self.min_improvement
            )));
        }
        Ok(())
    }
}

/// Forecast band settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Central coverage of the prediction band; 0.8 gives P10/P90
    pub coverage: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self { coverage: 0.8 }
    }
}

impl ForecastConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.coverage > 0.0 && self.coverage < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "coverage must lie strictly between 0 and 1, got {}",
                self.coverage
            )));
        }
        Ok(())
    }
}

/// How the training window moves between backtest folds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// Train on everything before the origin
    Expanding,
    /// Train on a fixed-length window ending at the origin
    Sliding,
}

/// Rolling-origin backtest settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Days forecast from each origin
    pub horizon: usize,
    /// Days between consecutive origins; defaults to the horizon
    pub step: Option<usize>,
    /// Training length at the first origin; defaults to the feature threshold
    pub initial_train: Option<usize>,
    /// Training window behaviour
    pub window: WindowKind,
    /// Fewest folds a report may be built from
    pub min_folds: usize,
    /// Keep only the most recent folds
    pub max_folds: Option<usize>,
    /// Relative sMAPE improvement over the moving-average baseline required to pass
    pub gate_margin: f64,
    /// Average band coverage the model must reach for the coverage gate
    pub coverage_min: f64,
    /// Moving-average baseline window
    pub ma_window: usize,
    /// Seasonal period for the seasonal naive baseline and the MASE scale
    pub season: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            horizon: 7,
            step: None,
            initial_train: None,
            window: WindowKind::Expanding,
            min_folds: 3,
            max_folds: None,
            gate_margin: 0.08,
            coverage_min: 0.85,
            ma_window: 7,
            season: 7,
        }
    }
}

impl BacktestConfig {
    /// Days between consecutive origins
    pub fn step(&self) -> usize {
        self.step.unwrap_or(self.horizon)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(ForecastError::InvalidHorizon(0));
        }
        if self.step() == 0 {
            return Err(ForecastError::InvalidParameter(
                "Backtest step must be at least 1".to_string(),
            ));
        }
        if self.min_folds == 0 {
            return Err(ForecastError::InvalidParameter(
                "min_folds must be at least 1".to_string(),
            ));
        }
        if let Some(max) = self.max_folds {
            if max < self.min_folds {
                return Err(ForecastError::InvalidParameter(format!(
                    "max_folds ({}) is below min_folds ({})",
                    max, self.min_folds
                )));
            }
        }
        if self.ma_window == 0 || self.season == 0 {
            return Err(ForecastError::InvalidParameter(
                "Baseline window and season must be at least 1".to_string(),
            ));
        }
        if !(self.gate_margin.is_finite() && self.gate_margin < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "gate_margin must be finite and below 1, got {}",
                self.gate_margin
            )));
        }
        if !(self.coverage_min > 0.0 && self.coverage_min <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "coverage_min must be in (0, 1], got {}",
                self.coverage_min
            )));
        }
        Ok(())
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub features: FeatureConfig,
    pub estimator: EstimatorConfig,
    pub forecast: ForecastConfig,
    pub backtest: BacktestConfig,
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.features.validate()?;
        self.estimator.validate()?;
        self.forecast.validate()?;
        self.backtest.validate()
    }
}
