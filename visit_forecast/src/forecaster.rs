//! Multi-step plug-in forecasts with negative-binomial bands

use crate::config::ForecastConfig;
use crate::data::ExogRow;
use crate::error::{ForecastError, Result};
use crate::features::Encoding;
use crate::fitted::FittedModel;
use crate::models::ArchMemory;
use crate::utils::future_dates;
use chrono::NaiveDate;
use count_math::distributions::central_z;
use count_math::{nb_variance, MEAN_FLOOR};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One forecast day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    /// Conditional mean `mu_t`
    pub mean: f64,
    /// Conditional dispersion `phi_t`
    pub dispersion: f64,
    /// Lower band, never below zero
    pub lower: f64,
    pub upper: f64,
}

impl ForecastPoint {
    /// Width of the prediction band
    pub fn band_width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Projects a fitted model forward day by day
#[derive(Debug, Clone, Default)]
pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    /// Create a forecaster from a validated configuration
    pub fn new(config: ForecastConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration in use
    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast `horizon` days following the model's last observed day.
    ///
    /// Future lagged counts are replaced by the forecast means and future
    /// residuals are zero, so the dispersion relaxes toward `a0` after `q`
    /// steps. `future_exog` supplies known signals by date; anything missing
    /// uses the training mean or the baseline level.
    pub fn forecast(
        &self,
        model: &FittedModel,
        horizon: usize,
        future_exog: Option<&BTreeMap<NaiveDate, ExogRow>>,
    ) -> Result<Vec<ForecastPoint>> {
        if horizon == 0 {
            return Err(ForecastError::InvalidHorizon(horizon));
        }

        let schema = model.schema();
        let params = model.params();
        let state = model.state();
        let z = central_z(self.config.coverage)?;

        let max_lag = schema.max_lag();
        if state.recent_counts.len() < max_lag {
            return Err(ForecastError::DataError(format!(
                "Model keeps {} recent counts but its largest lag is {}",
                state.recent_counts.len(),
                max_lag
            )));
        }

        let mut buffer = state.recent_counts.clone();
        let mut memory = ArchMemory::from_history(
            params.dispersion_order(),
            &state.recent_residuals,
            &state.recent_means,
        );
        let mut points = Vec::with_capacity(horizon);

        for date in future_dates(state.last_date, horizon)? {
            let lagged: Vec<f64> = schema
                .lags()
                .iter()
                .map(|&k| buffer[buffer.len() - k])
                .collect();
            let exog = future_exog.and_then(|rows| rows.get(&date));
            let row = schema.encode_row(date, &lagged, exog, Encoding::Lenient)?;

            let mean = params.mean(&row);
            let dispersion = memory.dispersion(params);
            if !(mean.is_finite() && dispersion.is_finite()) {
                return Err(ForecastError::DataError(format!(
                    "Forecast became non-finite on {}",
                    date
                )));
            }

            let spread = z * nb_variance(mean, dispersion).sqrt();
            points.push(ForecastPoint {
                date,
                mean,
                dispersion,
                lower: (mean - spread).max(0.0),
                upper: mean + spread,
            });

            buffer.push(mean);
            memory.push(0.0, mean.max(MEAN_FLOOR));
        }

        debug!(
            horizon,
            first = %points[0].date,
            fallback = model.is_fallback(),
            "forecast produced"
        );
        Ok(points)
    }
}
