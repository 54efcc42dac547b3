//! One-call training, forecasting and backtesting

use crate::registry::{DatasetId, ModelRegistry, RegisteredModel, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{info, warn};
use visit_forecast::{
    BacktestEvaluator, BacktestReport, CancelToken, EngineConfig, Estimator, ExogRow,
    ForecastPoint, Forecaster, VisitSeries,
};

/// Runs the engine with one configuration and keeps the fitted models
#[derive(Debug)]
pub struct ForecastService {
    config: EngineConfig,
    registry: ModelRegistry,
}

impl ForecastService {
    /// Create a service with an empty registry
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_registry(config, ModelRegistry::new())
    }

    /// Create a service around `registry`, e.g. one with a custom archive limit
    pub fn with_registry(config: EngineConfig, registry: ModelRegistry) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Fit a model on `series` and register it as current for `dataset`
    pub fn train(&self, dataset: &DatasetId, series: &VisitSeries) -> Result<RegisteredModel> {
        self.train_inner(dataset, series, None)
    }

    /// Like [`ForecastService::train`], cancellable through `token`.
    ///
    /// A cancelled fit still registers the fallback model.
    pub fn train_with_cancel(
        &self,
        dataset: &DatasetId,
        series: &VisitSeries,
        token: CancelToken,
    ) -> Result<RegisteredModel> {
        self.train_inner(dataset, series, Some(token))
    }

    fn train_inner(
        &self,
        dataset: &DatasetId,
        series: &VisitSeries,
        token: Option<CancelToken>,
    ) -> Result<RegisteredModel> {
        let lock = self.registry.fit_lock(dataset)?;
        let _guard = lock.acquire()?;

        let mut estimator = Estimator::new(self.config.estimator.clone())?;
        if let Some(token) = token {
            estimator = estimator.with_cancel(token);
        }

        info!(dataset = %dataset, n_obs = series.len(), "training");
        let model = estimator.fit(series, &self.config.features)?;
        if let Some(reason) = model.fallback_reason() {
            warn!(dataset = %dataset, reason = %reason, "registered model is the fallback");
        }
        self.registry.insert(dataset, model)
    }

    /// Forecast `horizon` days from the current model of `dataset`
    pub fn forecast(
        &self,
        dataset: &DatasetId,
        horizon: usize,
        future_exog: Option<&BTreeMap<NaiveDate, ExogRow>>,
    ) -> Result<Vec<ForecastPoint>> {
        let entry = self.registry.require(dataset)?;
        let forecaster = Forecaster::new(self.config.forecast.clone())?;
        Ok(forecaster.forecast(&entry.model, horizon, future_exog)?)
    }

    /// Rolling-origin backtest of the configured model on `series`
    pub fn backtest(&self, series: &VisitSeries) -> Result<BacktestReport> {
        let evaluator = BacktestEvaluator::new(
            self.config.features.clone(),
            Estimator::new(self.config.estimator.clone())?,
            Forecaster::new(self.config.forecast.clone())?,
            self.config.backtest.clone(),
        )?;
        Ok(evaluator.evaluate(series)?)
    }

    /// Forget the current model of `dataset`, e.g. after its data changed
    pub fn invalidate(&self, dataset: &DatasetId) -> Result<Option<RegisteredModel>> {
        self.registry.invalidate(dataset)
    }

    /// Drop `dataset` from the registry altogether, e.g. when a store closes
    pub fn forget(&self, dataset: &DatasetId) -> Result<Option<RegisteredModel>> {
        self.registry.forget(dataset)
    }
}
