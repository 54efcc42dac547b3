//! Rolling-origin backtesting against naive baselines
//!
//! Each fold fits the count model on the days before its origin, forecasts
//! the next `horizon` days and scores the forecast next to every baseline.
//! The report carries a quality gate comparing the model's average sMAPE with
//! the moving-average baseline, and a coverage gate on the prediction bands.
//! Accepting or rejecting the model is left to the caller.

use crate::config::{BacktestConfig, FeatureConfig, WindowKind};
use crate::data::VisitSeries;
use crate::error::{ForecastError, Result};
use crate::estimator::Estimator;
use crate::forecaster::Forecaster;
use crate::models::{Baseline, MovingAverageBaseline, NaiveBaseline, SeasonalNaiveBaseline};
use crate::utils::is_weekend;
use chrono::NaiveDate;
use count_math::accuracy::{bias, directional_accuracy, interval_coverage, mase, rmse, smape};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Errors of one forecast against the actuals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    /// Symmetric MAPE in percent
    pub smape: f64,
    /// `None` when the training series is flat and the forecast missed
    pub mase: Option<f64>,
    pub rmse: f64,
    /// Mean of forecast minus actual
    pub bias: f64,
    /// Share of day-over-day moves called correctly; `None` for one-day horizons
    pub directional_accuracy: Option<f64>,
    /// sMAPE over Saturdays and Sundays; `None` when the window has neither
    pub weekend_smape: Option<f64>,
    /// Share of actuals inside the prediction band; count model only
    pub coverage: Option<f64>,
}

impl FoldMetrics {
    fn score(
        actual: &[f64],
        forecast: &[f64],
        weekend: &[bool],
        training: &[f64],
        season: usize,
        band: Option<(&[f64], &[f64])>,
    ) -> Result<Self> {
        let (weekend_actual, weekend_forecast): (Vec<f64>, Vec<f64>) = actual
            .iter()
            .zip(forecast)
            .zip(weekend)
            .filter(|(_, flag)| **flag)
            .map(|((&a, &f), _)| (a, f))
            .unzip();
        let weekend_smape = if weekend_actual.is_empty() {
            None
        } else {
            Some(smape(&weekend_actual, &weekend_forecast)?)
        };

        let scaled = mase(actual, forecast, training, season)?;
        Ok(Self {
            smape: smape(actual, forecast)?,
            mase: scaled.is_finite().then_some(scaled),
            rmse: rmse(actual, forecast)?,
            bias: bias(actual, forecast)?,
            directional_accuracy: directional_accuracy(actual, forecast)?,
            weekend_smape,
            coverage: band
                .map(|(lower, upper)| interval_coverage(actual, lower, upper))
                .transpose()?,
        })
    }
}

/// First and last day of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub len: usize,
}

impl WindowSpan {
    fn of(series: &VisitSeries) -> Result<Self> {
        match (series.first_date(), series.last_date()) {
            (Some(start), Some(end)) => Ok(Self {
                start,
                end,
                len: series.len(),
            }),
            _ => Err(ForecastError::DataError("Empty backtest window".to_string())),
        }
    }
}

/// One rolling-origin fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestFold {
    pub index: usize,
    pub train: WindowSpan,
    pub test: WindowSpan,
    pub model: FoldMetrics,
    /// Baseline metrics keyed by baseline name
    pub baselines: BTreeMap<String, FoldMetrics>,
    /// Whether the fold's model was the estimator fallback
    pub fallback: bool,
}

/// Fold-averaged metrics.
///
/// Optional metrics average over the folds that have them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub smape: f64,
    pub mase: Option<f64>,
    pub rmse: f64,
    pub bias: f64,
    pub directional_accuracy: Option<f64>,
    pub weekend_smape: Option<f64>,
    pub coverage: Option<f64>,
}

impl MetricSummary {
    fn average<'a>(metrics: impl Iterator<Item = &'a FoldMetrics>) -> Self {
        let metrics: Vec<&FoldMetrics> = metrics.collect();
        let total = |field: fn(&FoldMetrics) -> f64| mean_of(metrics.iter().map(|m| field(m)));
        let present =
            |field: fn(&FoldMetrics) -> Option<f64>| mean_of(metrics.iter().filter_map(|m| field(m)));
        Self {
            smape: total(|m| m.smape).unwrap_or(0.0),
            mase: present(|m| m.mase),
            rmse: total(|m| m.rmse).unwrap_or(0.0),
            bias: total(|m| m.bias).unwrap_or(0.0),
            directional_accuracy: present(|m| m.directional_accuracy),
            weekend_smape: present(|m| m.weekend_smape),
            coverage: present(|m| m.coverage),
        }
    }
}

fn mean_of(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Relative sMAPE improvement of the model over a reference baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGate {
    pub baseline: String,
    pub model_smape: f64,
    pub baseline_smape: f64,
    /// `(baseline_smape - model_smape) / baseline_smape`; `None` when the
    /// baseline was perfect and the model was not
    pub lift: Option<f64>,
    /// Required lift
    pub margin: f64,
    pub passed: bool,
}

impl QualityGate {
    fn new(baseline: &str, model_smape: f64, baseline_smape: f64, margin: f64) -> Self {
        let lift = if baseline_smape > f64::EPSILON {
            Some((baseline_smape - model_smape) / baseline_smape)
        } else if model_smape <= f64::EPSILON {
            Some(0.0)
        } else {
            None
        };
        Self {
            baseline: baseline.to_string(),
            model_smape,
            baseline_smape,
            lift,
            margin,
            passed: lift.map_or(false, |lift| lift >= margin),
        }
    }
}

/// Average band coverage of the model against the configured minimum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageGate {
    pub coverage: Option<f64>,
    pub minimum: f64,
    pub passed: bool,
}

impl CoverageGate {
    fn new(coverage: Option<f64>, minimum: f64) -> Self {
        Self {
            coverage,
            minimum,
            passed: coverage.map_or(false, |c| c >= minimum),
        }
    }
}

/// Complete backtest outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub folds: Vec<BacktestFold>,
    pub model: MetricSummary,
    pub baselines: BTreeMap<String, MetricSummary>,
    pub gate: QualityGate,
    pub coverage_gate: CoverageGate,
}

impl BacktestReport {
    /// Number of folds evaluated
    pub fn n_folds(&self) -> usize {
        self.folds.len()
    }

    /// Folds where the estimator fell back
    pub fn fallback_folds(&self) -> usize {
        self.folds.iter().filter(|f| f.fallback).count()
    }
}

/// Rolling-origin evaluator
#[derive(Debug)]
pub struct BacktestEvaluator {
    features: FeatureConfig,
    estimator: Estimator,
    forecaster: Forecaster,
    config: BacktestConfig,
    gate_baseline: MovingAverageBaseline,
    baselines: Vec<Box<dyn Baseline>>,
}

impl BacktestEvaluator {
    /// Create an evaluator; baselines are the moving average, naive and seasonal naive
    pub fn new(
        features: FeatureConfig,
        estimator: Estimator,
        forecaster: Forecaster,
        config: BacktestConfig,
    ) -> Result<Self> {
        features.validate()?;
        config.validate()?;
        let gate_baseline = MovingAverageBaseline::new(config.ma_window)?;
        let baselines: Vec<Box<dyn Baseline>> = vec![
            Box::new(gate_baseline.clone()),
            Box::new(NaiveBaseline),
            Box::new(SeasonalNaiveBaseline::new(config.season)?),
        ];
        Ok(Self {
            features,
            estimator,
            forecaster,
            config,
            gate_baseline,
            baselines,
        })
    }

    /// The backtest configuration in use
    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Training length at the first origin, and the sliding window length
    pub fn initial_train(&self) -> usize {
        self.config
            .initial_train
            .unwrap_or_else(|| self.features.required_observations())
    }

    /// Fold origins (index of the first test day) for a series of `n` days
    pub fn origins(&self, n: usize) -> Result<Vec<usize>> {
        let required = self.features.required_observations();
        let initial = self.initial_train();
        if initial < required {
            return Err(ForecastError::InvalidParameter(format!(
                "initial_train ({}) is below the {} observations a fit needs",
                initial, required
            )));
        }

        let horizon = self.config.horizon;
        let mut origins: Vec<usize> = (initial..)
            .step_by(self.config.step())
            .take_while(|&origin| origin + horizon <= n)
            .collect();

        if let Some(max) = self.config.max_folds {
            let skip = origins.len().saturating_sub(max);
            origins.drain(..skip);
        }

        if origins.len() < self.config.min_folds {
            return Err(ForecastError::InsufficientFolds {
                required: self.config.min_folds,
                available: origins.len(),
            });
        }
        Ok(origins)
    }

    /// Run every fold and build the report
    pub fn evaluate(&self, series: &VisitSeries) -> Result<BacktestReport> {
        let origins = self.origins(series.len())?;
        let window_len = self.initial_train();
        info!(
            n_obs = series.len(),
            folds = origins.len(),
            horizon = self.config.horizon,
            "starting backtest"
        );

        let folds = origins
            .iter()
            .enumerate()
            .map(|(index, &origin)| {
                let train_start = match self.config.window {
                    WindowKind::Expanding => 0,
                    WindowKind::Sliding => origin.saturating_sub(window_len),
                };
                self.run_fold(index, series, train_start, origin)
            })
            .collect::<Result<Vec<_>>>()?;

        let model = MetricSummary::average(folds.iter().map(|f| &f.model));
        let baselines: BTreeMap<String, MetricSummary> = self
            .baselines
            .iter()
            .map(|b| {
                let name = b.name().to_string();
                let summary =
                    MetricSummary::average(folds.iter().filter_map(|f| f.baselines.get(&name)));
                (name, summary)
            })
            .collect();

        let reference = self.gate_baseline.name();
        let baseline_smape = baselines
            .get(reference)
            .map(|s| s.smape)
            .ok_or_else(|| ForecastError::DataError(format!("Missing baseline {}", reference)))?;
        let gate = QualityGate::new(reference, model.smape, baseline_smape, self.config.gate_margin);

        if gate.passed {
            info!(
                lift = ?gate.lift,
                margin = gate.margin,
                model_smape = gate.model_smape,
                "backtest passed quality gate"
            );
        } else {
            warn!(
                lift = ?gate.lift,
                margin = gate.margin,
                model_smape = gate.model_smape,
                baseline_smape = gate.baseline_smape,
                "backtest failed quality gate"
            );
        }

        let coverage_gate = CoverageGate::new(model.coverage, self.config.coverage_min);
        if !coverage_gate.passed {
            warn!(
                coverage = ?coverage_gate.coverage,
                minimum = coverage_gate.minimum,
                "backtest failed coverage gate"
            );
        }

        Ok(BacktestReport {
            folds,
            model,
            baselines,
            gate,
            coverage_gate,
        })
    }

    fn run_fold(
        &self,
        index: usize,
        series: &VisitSeries,
        train_start: usize,
        origin: usize,
    ) -> Result<BacktestFold> {
        let horizon = self.config.horizon;
        let train = series.slice(train_start, origin)?;
        let test = series.slice(origin, origin + horizon)?;
        let history = train.counts();
        let actual = test.counts();
        let weekend: Vec<bool> = test.dates().into_iter().map(is_weekend).collect();

        let fitted = self.estimator.fit(&train, &self.features)?;
        let points = self
            .forecaster
            .forecast(&fitted, horizon, Some(&test.exog_by_date()))?;
        let means: Vec<f64> = points.iter().map(|p| p.mean).collect();
        let lower: Vec<f64> = points.iter().map(|p| p.lower).collect();
        let upper: Vec<f64> = points.iter().map(|p| p.upper).collect();

        let season = self.config.season;
        let band = Some((lower.as_slice(), upper.as_slice()));
        let model = FoldMetrics::score(&actual, &means, &weekend, &history, season, band)?;

        let mut baselines = BTreeMap::new();
        for baseline in &self.baselines {
            let forecast = baseline.forecast(&history, horizon)?;
            let metrics =
                FoldMetrics::score(&actual, &forecast, &weekend, &history, season, None)?;
            baselines.insert(baseline.name().to_string(), metrics);
        }

        debug!(
            fold = index,
            origin,
            train_len = train.len(),
            smape = model.smape,
            fallback = fitted.is_fallback(),
            "backtest fold scored"
        );

        Ok(BacktestFold {
            index,
            train: WindowSpan::of(&train)?,
            test: WindowSpan::of(&test)?,
            model,
            baselines,
            fallback: fitted.is_fallback(),
        })
    }
}
