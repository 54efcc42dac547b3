//! The immutable result of a fit

use crate::error::{ForecastError, Result};
use crate::features::FeatureSchema;
use crate::models::ModelParameters;
use chrono::NaiveDate;
use count_math::ForecastAccuracy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the estimator returned the AR(1) fallback instead of an MLE fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// The optimizer ran out of iterations before converging
    NotConverged,
    /// The optimizer converged without beating the initial guess
    NoImprovement,
    /// The caller cancelled the fit
    Cancelled,
    /// The wall-clock budget ran out
    BudgetExhausted,
    /// The objective was non-finite or the optimizer failed
    Degenerate,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FallbackReason::NotConverged => "optimizer did not converge",
            FallbackReason::NoImprovement => "optimizer did not improve on the initial guess",
            FallbackReason::Cancelled => "fit was cancelled",
            FallbackReason::BudgetExhausted => "time budget exhausted",
            FallbackReason::Degenerate => "likelihood was degenerate",
        };
        f.write_str(text)
    }
}

/// Optimizer bookkeeping and in-sample fit quality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    /// Optimizer iterations summed over attempts
    pub iterations: u64,
    /// Optimizer attempts made (0 when the optimizer never ran)
    pub attempts: u32,
    /// Mean negative log-likelihood at the initial guess
    pub initial_objective: Option<f64>,
    /// One-step-ahead accuracy on the training rows, when finite
    pub in_sample: Option<ForecastAccuracy>,
}

/// State the forecast recursion resumes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastState {
    /// Last observed day
    pub last_date: NaiveDate,
    /// Most recent `max(lag)` counts, oldest first
    pub recent_counts: Vec<f64>,
    /// Most recent `q` one-step residuals, oldest first
    pub recent_residuals: Vec<f64>,
    /// Conditional means matching `recent_residuals`
    pub recent_means: Vec<f64>,
}

/// A fitted NB-INGARCH model with its metadata.
///
/// Deserialized models are checked with [`FittedModel::validate`] before they
/// are handed out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredModel")]
pub struct FittedModel {
    params: ModelParameters,
    schema: FeatureSchema,
    log_likelihood: Option<f64>,
    converged: bool,
    fallback: bool,
    fallback_reason: Option<FallbackReason>,
    n_obs: usize,
    diagnostics: FitDiagnostics,
    state: ForecastState,
}

impl FittedModel {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        params: ModelParameters,
        schema: FeatureSchema,
        log_likelihood: f64,
        fallback_reason: Option<FallbackReason>,
        n_obs: usize,
        diagnostics: FitDiagnostics,
        state: ForecastState,
    ) -> Self {
        Self {
            params,
            schema,
            log_likelihood: log_likelihood.is_finite().then_some(log_likelihood),
            converged: fallback_reason.is_none(),
            fallback: fallback_reason.is_some(),
            fallback_reason,
            n_obs,
            diagnostics,
            state,
        }
    }

    /// Fitted coefficients
    pub fn params(&self) -> &ModelParameters {
        &self.params
    }

    /// Feature layout used in training
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Autoregressive order `p` (number of lags)
    pub fn ar_order(&self) -> usize {
        self.params.ar.len()
    }

    /// Dispersion order `q`
    pub fn dispersion_order(&self) -> usize {
        self.params.arch.len()
    }

    /// Log-likelihood of the training rows at the returned parameters
    pub fn log_likelihood(&self) -> Option<f64> {
        self.log_likelihood
    }

    /// True when the optimizer converged and beat the initial guess
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// True when the AR(1) fallback was returned
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// Why the fallback was returned
    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        self.fallback_reason
    }

    /// Number of observations in the training series
    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    /// Optimizer and fit-quality diagnostics
    pub fn diagnostics(&self) -> &FitDiagnostics {
        &self.diagnostics
    }

    /// Where the forecast recursion starts
    pub fn state(&self) -> &ForecastState {
        &self.state
    }

    /// Coefficient of the named design column, e.g. `"lag_7"` or `"promo"`
    pub fn coefficient(&self, column: &str) -> Option<f64> {
        let position = self.schema.columns().iter().position(|c| c == column)?;
        let p = self.params.ar.len();
        match position {
            0 => Some(self.params.intercept),
            i if i <= p => self.params.ar.get(i - 1).copied(),
            i => self.params.exogenous.get(i - 1 - p).copied(),
        }
    }

    /// Check that parameters, schema and recursion state agree.
    ///
    /// Fitted models always pass; this guards models read back from storage.
    pub fn validate(&self) -> Result<()> {
        self.schema.validate()?;

        let lags = self.schema.lags();
        if self.params.ar.len() != lags.len() {
            return Err(invalid(format!(
                "Model has {} AR coefficients for {} lags",
                self.params.ar.len(),
                lags.len()
            )));
        }
        if self.params.width() != self.schema.width() {
            return Err(invalid(format!(
                "Mean equation has {} coefficients but the schema has {} columns",
                self.params.width(),
                self.schema.width()
            )));
        }
        let mut mean_coefficients = std::iter::once(self.params.intercept)
            .chain(self.params.ar.iter().copied())
            .chain(self.params.exogenous.iter().copied());
        if mean_coefficients.any(|b| !b.is_finite()) {
            return Err(invalid("Mean coefficients must be finite".to_string()));
        }
        if !self.params.dispersion_is_admissible() {
            return Err(invalid(
                "Dispersion coefficients must be finite and non-negative".to_string(),
            ));
        }
        if self.converged != self.fallback_reason.is_none()
            || self.fallback != self.fallback_reason.is_some()
        {
            return Err(invalid(
                "Convergence flags disagree with the fallback reason".to_string(),
            ));
        }

        let state = &self.state;
        let max_lag = self.schema.max_lag();
        if state.recent_counts.len() < max_lag {
            return Err(invalid(format!(
                "Forecast state holds {} counts, the largest lag is {}",
                state.recent_counts.len(),
                max_lag
            )));
        }
        if state.recent_counts.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(invalid(
                "Forecast state counts must be finite and non-negative".to_string(),
            ));
        }

        let q = self.params.dispersion_order();
        if state.recent_residuals.len() != q || state.recent_means.len() != q {
            return Err(invalid(format!(
                "Forecast state holds {} residuals and {} means, dispersion order is {}",
                state.recent_residuals.len(),
                state.recent_means.len(),
                q
            )));
        }
        if state.recent_residuals.iter().any(|e| !e.is_finite())
            || state.recent_means.iter().any(|mu| !mu.is_finite() || *mu <= 0.0)
        {
            return Err(invalid(
                "Forecast state residuals must be finite and means positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    ///
    /// Malformed JSON is a `SerializationError`; well-formed JSON describing
    /// an inconsistent model is an `InvalidParameter`.
    pub fn from_json(text: &str) -> Result<Self> {
        let stored: StoredModel = serde_json::from_str(text)?;
        Self::try_from(stored)
    }
}

fn invalid(message: String) -> ForecastError {
    ForecastError::InvalidParameter(message)
}

/// Wire form of [`FittedModel`], before validation
#[derive(Deserialize)]
struct StoredModel {
    params: ModelParameters,
    schema: FeatureSchema,
    log_likelihood: Option<f64>,
    converged: bool,
    fallback: bool,
    fallback_reason: Option<FallbackReason>,
    n_obs: usize,
    diagnostics: FitDiagnostics,
    state: ForecastState,
}

impl TryFrom<StoredModel> for FittedModel {
    type Error = ForecastError;

    fn try_from(stored: StoredModel) -> Result<Self> {
        let model = FittedModel {
            params: stored.params,
            schema: stored.schema,
            log_likelihood: stored.log_likelihood,
            converged: stored.converged,
            fallback: stored.fallback,
            fallback_reason: stored.fallback_reason,
            n_obs: stored.n_obs,
            diagnostics: stored.diagnostics,
            state: stored.state,
        };
        model.validate()?;
        Ok(model)
    }
}
