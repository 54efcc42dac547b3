//! Maximum-likelihood estimation of the NB-INGARCH model
//!
//! The search runs Nelder-Mead over an unconstrained parameter vector
//! `[b0, b_lags.., g.., softplus^-1(a0), softplus^-1(a_1)..]`, so dispersion
//! coefficients are positive by construction. A failed attempt is retried once
//! from a deterministically perturbed start; if that fails too the estimator
//! returns an AR(1)-on-mean fallback with moment-matched dispersion.

use crate::cancel::CancelToken;
use crate::config::{EstimatorConfig, FeatureConfig};
use crate::data::VisitSeries;
use crate::error::{ForecastError, Result};
use crate::features::{DesignMatrix, FeatureBuilder};
use crate::fitted::{FallbackReason, FitDiagnostics, FittedModel, ForecastState};
use crate::models::{filter, log_likelihood, ModelParameters};
use argmin::core::observers::{Observe, ObserverMode};
use argmin::core::{
    ArgminError, CostFunction, Error as ArgminFailure, Executor, State, TerminationReason, KV,
};
use argmin::solver::neldermead::NelderMead;
use count_math::{forecast_accuracy, safe_softplus, safe_softplus_inv, stats};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const AR_INIT_MIN: f64 = 0.05;
const AR_INIT_MAX: f64 = 0.4;
const AR_INIT_TOTAL: f64 = 0.8;
const ARCH_INIT_SHARE: f64 = 0.1;
const SIMPLEX_STEP: f64 = 0.1;
const SIMPLEX_MIN_STEP: f64 = 0.05;
const RETRY_JITTER: f64 = 0.1;
const FALLBACK_MAX_AR: f64 = 0.95;
const IN_SAMPLE_SEASON: usize = 7;

/// Positions of each coefficient group in the search vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ParameterLayout {
    n_ar: usize,
    n_exog: usize,
    q: usize,
}

impl ParameterLayout {
    fn for_design(design: &DesignMatrix, q: usize) -> Self {
        let n_ar = design.schema().lags().len();
        Self {
            n_ar,
            n_exog: design.width() - 1 - n_ar,
            q,
        }
    }

    fn len(&self) -> usize {
        1 + self.n_ar + self.n_exog + 1 + self.q
    }

    fn to_vector(self, params: &ModelParameters) -> Vec<f64> {
        let mut theta = Vec::with_capacity(self.len());
        theta.push(params.intercept);
        theta.extend_from_slice(&params.ar);
        theta.extend_from_slice(&params.exogenous);
        theta.push(safe_softplus_inv(params.alpha0));
        theta.extend(params.arch.iter().map(|&a| safe_softplus_inv(a)));
        theta
    }

    fn to_params(self, theta: &[f64]) -> ModelParameters {
        let ar_end = 1 + self.n_ar;
        let exog_end = ar_end + self.n_exog;
        ModelParameters {
            intercept: theta[0],
            ar: theta[1..ar_end].to_vec(),
            exogenous: theta[ar_end..exog_end].to_vec(),
            alpha0: safe_softplus(theta[exog_end]),
            arch: theta[exog_end + 1..]
                .iter()
                .map(|&raw| safe_softplus(raw))
                .collect(),
        }
    }
}

/// Mean negative log-likelihood over the design rows
struct Objective<'a> {
    design: &'a DesignMatrix,
    layout: ParameterLayout,
}

impl Objective<'_> {
    fn evaluate(&self, theta: &[f64]) -> f64 {
        if theta.len() != self.layout.len() {
            return f64::INFINITY;
        }
        let params = self.layout.to_params(theta);
        let cost = -log_likelihood(&params, self.design) / self.design.len() as f64;
        if cost.is_finite() {
            cost
        } else {
            f64::INFINITY
        }
    }
}

impl CostFunction for Objective<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, theta: &Self::Param) -> std::result::Result<Self::Output, ArgminFailure> {
        Ok(self.evaluate(theta))
    }
}

fn interruption(cancel: Option<&CancelToken>, deadline: Option<Instant>) -> Option<FallbackReason> {
    if cancel.is_some_and(CancelToken::is_cancelled) {
        Some(FallbackReason::Cancelled)
    } else if deadline.is_some_and(|d| Instant::now() >= d) {
        Some(FallbackReason::BudgetExhausted)
    } else {
        None
    }
}

/// Stops the executor between iterations on cancellation or timeout
struct BudgetObserver {
    cancel: Option<CancelToken>,
    deadline: Option<Instant>,
}

impl<I> Observe<I> for BudgetObserver {
    fn observe_iter(&mut self, _state: &I, _kv: &KV) -> std::result::Result<(), ArgminFailure> {
        match interruption(self.cancel.as_ref(), self.deadline) {
            Some(reason) => Err(ArgminError::ConditionViolated {
                text: reason.to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptStatus {
    Converged,
    OutOfIterations,
    Interrupted(FallbackReason),
    Failed,
}

#[derive(Debug)]
struct Attempt {
    best: Option<Vec<f64>>,
    best_cost: f64,
    iterations: u64,
    status: AttemptStatus,
}

/// Fits NB-INGARCH models by maximum likelihood
#[derive(Debug, Clone, Default)]
pub struct Estimator {
    config: EstimatorConfig,
    cancel: Option<CancelToken>,
}

impl Estimator {
    /// Create an estimator from a validated configuration
    pub fn new(config: EstimatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: None,
        })
    }

    /// Make the fit cancellable through `token`
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The configuration in use
    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Fit a model to `series`.
    ///
    /// Errors only on caller-input problems (too little data, bad
    /// configuration, malformed exogenous columns). Optimizer trouble is never
    /// an error: it yields the fallback model with `fallback = true`.
    pub fn fit(&self, series: &VisitSeries, features: &FeatureConfig) -> Result<FittedModel> {
        let design = FeatureBuilder::new(features.clone())?.build(series)?;
        let counts = series.counts();
        let q = self.config.dispersion_order;
        let layout = ParameterLayout::for_design(&design, q);
        let deadline = self
            .config
            .time_budget_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));

        info!(
            n_obs = series.len(),
            rows = design.len(),
            columns = design.width(),
            q,
            "fitting NB-INGARCH model"
        );

        let initial = initial_guess(&design, &counts, q)?;
        let theta0 = layout.to_vector(&initial);
        let objective = Objective {
            design: &design,
            layout,
        };
        let initial_cost = objective.evaluate(&theta0);
        if !initial_cost.is_finite() {
            warn!("initial guess has a non-finite likelihood");
            return self.fallback(series, &design, FallbackReason::Degenerate, 0, 0, None);
        }

        let max_attempts = if self.config.retry { 2 } else { 1 };
        let mut rng = StdRng::seed_from_u64(summary_seed(&counts));
        let mut start = theta0;
        let mut attempts = 0u32;
        let mut iterations = 0u64;
        let mut reason = FallbackReason::NotConverged;

        while attempts < max_attempts {
            if let Some(stop) = interruption(self.cancel.as_ref(), deadline) {
                reason = stop;
                break;
            }
            if attempts > 0 {
                start = perturb(&start, &mut rng);
            }
            attempts += 1;

            let attempt = self.run_attempt(&design, layout, &start, deadline);
            iterations += attempt.iterations;
            debug!(
                attempt = attempts,
                iterations = attempt.iterations,
                best_cost = attempt.best_cost,
                initial_cost,
                status = ?attempt.status,
                "optimizer attempt finished"
            );

            match attempt.status {
                AttemptStatus::Converged
                    if attempt.best_cost.is_finite()
                        && initial_cost - attempt.best_cost >= self.config.min_improvement =>
                {
                    if let Some(best) = attempt.best.as_deref() {
                        let params = layout.to_params(best);
                        info!(
                            attempts,
                            iterations,
                            mean_nll = attempt.best_cost,
                            "NB-INGARCH fit converged"
                        );
                        let diagnostics = FitDiagnostics {
                            iterations,
                            attempts,
                            initial_objective: Some(initial_cost),
                            in_sample: None,
                        };
                        return assemble(series, &design, params, None, diagnostics);
                    }
                    reason = FallbackReason::Degenerate;
                }
                AttemptStatus::Converged => reason = FallbackReason::NoImprovement,
                AttemptStatus::OutOfIterations => reason = FallbackReason::NotConverged,
                AttemptStatus::Interrupted(stop) => {
                    reason = stop;
                    break;
                }
                AttemptStatus::Failed => reason = FallbackReason::Degenerate,
            }

            if attempt.best_cost.is_finite() {
                if let Some(best) = attempt.best {
                    start = best;
                }
            }
        }

        warn!(reason = %reason, attempts, iterations, "falling back to AR(1) model");
        self.fallback(series, &design, reason, attempts, iterations, Some(initial_cost))
    }

    fn run_attempt(
        &self,
        design: &DesignMatrix,
        layout: ParameterLayout,
        start: &[f64],
        deadline: Option<Instant>,
    ) -> Attempt {
        let failed = Attempt {
            best: None,
            best_cost: f64::INFINITY,
            iterations: 0,
            status: AttemptStatus::Failed,
        };

        let solver = match NelderMead::new(initial_simplex(start))
            .with_sd_tolerance(self.config.sd_tolerance)
        {
            Ok(solver) => solver,
            Err(err) => {
                warn!(error = %err, "could not configure Nelder-Mead");
                return failed;
            }
        };

        let observer = BudgetObserver {
            cancel: self.cancel.clone(),
            deadline,
        };
        let max_iters = self.config.max_iters;
        let problem = Objective { design, layout };

        let result = Executor::new(problem, solver)
            .configure(|state| state.max_iters(max_iters))
            .add_observer(observer, ObserverMode::Always)
            .run();

        match result {
            Ok(result) => {
                let state = result.state();
                let status = match state.get_termination_reason() {
                    Some(TerminationReason::SolverConverged) => AttemptStatus::Converged,
                    Some(TerminationReason::MaxItersReached) => AttemptStatus::OutOfIterations,
                    _ => AttemptStatus::Failed,
                };
                Attempt {
                    best: state.get_best_param().cloned(),
                    best_cost: state.get_best_cost(),
                    iterations: state.get_iter(),
                    status,
                }
            }
            Err(err) => match interruption(self.cancel.as_ref(), deadline) {
                Some(stop) => Attempt {
                    status: AttemptStatus::Interrupted(stop),
                    ..failed
                },
                None => {
                    warn!(error = %err, "optimizer failed");
                    failed
                }
            },
        }
    }

    fn fallback(
        &self,
        series: &VisitSeries,
        design: &DesignMatrix,
        reason: FallbackReason,
        attempts: u32,
        iterations: u64,
        initial_objective: Option<f64>,
    ) -> Result<FittedModel> {
        let params = fallback_parameters(design, &series.counts(), self.config.dispersion_order)?;
        let diagnostics = FitDiagnostics {
            iterations,
            attempts,
            initial_objective,
            in_sample: None,
        };
        assemble(series, design, params, Some(reason), diagnostics)
    }
}

/// Structured starting point for the search.
///
/// AR terms start at their sample autocorrelations clamped to a mild positive
/// range and scaled to sum to at most 0.8; the intercept matches the sample
/// mean; dispersion starts at the moment estimate with small ARCH terms.
fn initial_guess(design: &DesignMatrix, counts: &[f64], q: usize) -> Result<ModelParameters> {
    let mean = stats::mean(counts)?;
    let mut ar = design
        .schema()
        .lags()
        .iter()
        .map(|&lag| stats::autocorrelation(counts, lag).map(|r| r.clamp(AR_INIT_MIN, AR_INIT_MAX)))
        .collect::<std::result::Result<Vec<f64>, _>>()?;

    let total: f64 = ar.iter().sum();
    if total > AR_INIT_TOTAL {
        for a in &mut ar {
            *a *= AR_INIT_TOTAL / total;
        }
    }

    let alpha0 = stats::moment_dispersion(counts)?;
    Ok(ModelParameters {
        intercept: mean * (1.0 - ar.iter().sum::<f64>()),
        exogenous: vec![0.0; design.width() - 1 - ar.len()],
        ar,
        alpha0,
        arch: vec![ARCH_INIT_SHARE * alpha0; q],
    })
}

/// AR(1) on the smallest configured lag with moment-matched dispersion
fn fallback_parameters(design: &DesignMatrix, counts: &[f64], q: usize) -> Result<ModelParameters> {
    let lags = design.schema().lags();
    let (position, lag) = lags
        .iter()
        .copied()
        .enumerate()
        .min_by_key(|&(_, lag)| lag)
        .ok_or_else(|| ForecastError::InvalidParameter("No autoregressive lags".to_string()))?;

    let (intercept, phi) = stats::lag_regression(counts, lag, FALLBACK_MAX_AR)?;
    let mut ar = vec![0.0; lags.len()];
    ar[position] = phi;

    Ok(ModelParameters {
        intercept,
        exogenous: vec![0.0; design.width() - 1 - lags.len()],
        ar,
        alpha0: stats::moment_dispersion(counts)?,
        arch: vec![0.0; q],
    })
}

fn assemble(
    series: &VisitSeries,
    design: &DesignMatrix,
    params: ModelParameters,
    reason: Option<FallbackReason>,
    mut diagnostics: FitDiagnostics,
) -> Result<FittedModel> {
    let filtered = filter(&params, design);
    diagnostics.in_sample = forecast_accuracy(
        design.targets(),
        &filtered.means,
        design.targets(),
        IN_SAMPLE_SEASON,
    )
    .ok()
    .filter(|a| a.mae.is_finite() && a.rmse.is_finite() && a.smape.is_finite() && a.mase.is_finite());

    let last_date = series
        .last_date()
        .ok_or_else(|| ForecastError::DataError("Cannot fit an empty series".to_string()))?;
    let counts = series.counts();
    let q = params.dispersion_order();
    let state = ForecastState {
        last_date,
        recent_counts: tail(&counts, design.schema().max_lag()),
        recent_residuals: padded_tail(&filtered.residuals, q, 0.0),
        recent_means: padded_tail(&filtered.means, q, 1.0),
    };

    Ok(FittedModel::new(
        params,
        design.schema().clone(),
        filtered.log_likelihood,
        reason,
        series.len(),
        diagnostics,
        state,
    ))
}

fn tail(values: &[f64], n: usize) -> Vec<f64> {
    values[values.len().saturating_sub(n)..].to_vec()
}

/// Last `n` values, front-padded with `fill` when there are fewer.
///
/// A zero residual over a unit mean adds nothing to the ARCH memory.
fn padded_tail(values: &[f64], n: usize, fill: f64) -> Vec<f64> {
    let mut out = vec![fill; n.saturating_sub(values.len())];
    out.extend_from_slice(&values[values.len().saturating_sub(n)..]);
    out
}

fn initial_simplex(start: &[f64]) -> Vec<Vec<f64>> {
    let mut simplex = Vec::with_capacity(start.len() + 1);
    simplex.push(start.to_vec());
    for i in 0..start.len() {
        let mut vertex = start.to_vec();
        vertex[i] += (SIMPLEX_STEP * start[i].abs()).max(SIMPLEX_MIN_STEP);
        simplex.push(vertex);
    }
    simplex
}

/// Seed derived from the data alone, so refits of the same series agree
fn summary_seed(counts: &[f64]) -> u64 {
    let mean = stats::mean(counts).unwrap_or(0.0);
    let variance = stats::variance(counts).unwrap_or(0.0);
    mean.to_bits() ^ variance.to_bits().rotate_left(17) ^ counts.len() as u64
}

fn perturb(theta: &[f64], rng: &mut StdRng) -> Vec<f64> {
    theta
        .iter()
        .map(|&x| x + RETRY_JITTER * x.abs().max(1.0) * rng.gen_range(-1.0..=1.0))
        .collect()
}
