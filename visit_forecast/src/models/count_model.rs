//! Negative-binomial INGARCH count model
//!
//! Conditional mean:
//! `mu_t = b0 + sum_i b_i * y_{t-lag_i} + sum_j g_j * x_{t,j}`, floored at
//! [`MEAN_FLOOR`].
//!
//! Conditional dispersion:
//! `phi_t = a0 + sum_{i=1..q} a_i * e^2_{t-i} / mu_{t-i}` with `e = y - mu`,
//! floored at [`DISPERSION_FLOOR`]. Residuals before the first design row
//! are zero.
//!
//! Observations are NB with mean `mu_t` and variance `mu_t + phi_t * mu_t^2`.

use crate::features::DesignMatrix;
use count_math::{nb_log_pmf, DISPERSION_FLOOR, MEAN_FLOOR};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Mean- and dispersion-equation coefficients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Mean intercept `b0`
    pub intercept: f64,
    /// Autoregressive coefficients, one per configured lag
    pub ar: Vec<f64>,
    /// Calendar and exogenous coefficients, in schema column order
    pub exogenous: Vec<f64>,
    /// Dispersion intercept `a0`
    pub alpha0: f64,
    /// ARCH coefficients `a_1..a_q`
    pub arch: Vec<f64>,
}

impl ModelParameters {
    /// Number of ARCH terms
    pub fn dispersion_order(&self) -> usize {
        self.arch.len()
    }

    /// Expected design-row width
    pub fn width(&self) -> usize {
        1 + self.ar.len() + self.exogenous.len()
    }

    /// True when every dispersion coefficient is finite and non-negative
    pub fn dispersion_is_admissible(&self) -> bool {
        std::iter::once(self.alpha0)
            .chain(self.arch.iter().copied())
            .all(|a| a.is_finite() && a >= 0.0)
    }

    /// Conditional mean for one design row.
    ///
    /// Finite values are floored at [`MEAN_FLOOR`]; non-finite values are
    /// passed through so the caller can reject the parameter vector.
    pub fn mean(&self, row: &[f64]) -> f64 {
        let coefficients = std::iter::once(self.intercept)
            .chain(self.ar.iter().copied())
            .chain(self.exogenous.iter().copied());
        let mu: f64 = coefficients.zip(row).map(|(b, x)| b * x).sum();
        if mu.is_finite() {
            mu.max(MEAN_FLOOR)
        } else {
            mu
        }
    }
}

/// Rolling memory of the standardized squared residuals `e^2 / mu`
#[derive(Debug, Clone)]
pub struct ArchMemory {
    terms: VecDeque<f64>,
}

impl ArchMemory {
    /// Memory of `order` terms, all zero
    pub fn new(order: usize) -> Self {
        Self {
            terms: std::iter::repeat(0.0).take(order).collect(),
        }
    }

    /// Memory primed with past residuals and means, oldest first
    pub fn from_history(order: usize, residuals: &[f64], means: &[f64]) -> Self {
        let mut memory = Self::new(order);
        for (&e, &mu) in residuals.iter().zip(means) {
            memory.push(e, mu);
        }
        memory
    }

    /// Record the residual and mean of the latest period
    pub fn push(&mut self, residual: f64, mean: f64) {
        if self.terms.is_empty() {
            return;
        }
        self.terms.pop_front();
        self.terms.push_back(residual * residual / mean);
    }

    /// Conditional dispersion given the current memory.
    ///
    /// Floored at [`DISPERSION_FLOOR`] when finite.
    pub fn dispersion(&self, params: &ModelParameters) -> f64 {
        // arch[0] pairs with the most recent term
        let phi = params.alpha0
            + params
                .arch
                .iter()
                .zip(self.terms.iter().rev())
                .map(|(a, term)| a * term)
                .sum::<f64>();
        if phi.is_finite() {
            phi.max(DISPERSION_FLOOR)
        } else {
            phi
        }
    }
}

/// One-step-ahead filter output over a design matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Filtered {
    pub means: Vec<f64>,
    pub dispersions: Vec<f64>,
    pub residuals: Vec<f64>,
    /// Sum of NB log-probabilities; `-inf` when any period is degenerate
    pub log_likelihood: f64,
}

/// Run the mean and dispersion recursions over every design row.
pub fn filter(params: &ModelParameters, design: &DesignMatrix) -> Filtered {
    let n = design.len();
    let mut means = Vec::with_capacity(n);
    let mut dispersions = Vec::with_capacity(n);
    let mut residuals = Vec::with_capacity(n);
    let mut memory = ArchMemory::new(params.dispersion_order());
    let mut log_likelihood = 0.0;

    for (row, &y) in design.rows().iter().zip(design.targets()) {
        let mu = params.mean(row);
        let phi = memory.dispersion(params);

        if !(mu.is_finite() && phi.is_finite()) {
            log_likelihood = f64::NEG_INFINITY;
        } else if log_likelihood > f64::NEG_INFINITY {
            log_likelihood += nb_log_pmf(y, mu, phi);
        }

        let e = y - mu;
        memory.push(e, mu);
        means.push(mu);
        dispersions.push(phi);
        residuals.push(e);
    }

    if !log_likelihood.is_finite() {
        log_likelihood = f64::NEG_INFINITY;
    }

    Filtered {
        means,
        dispersions,
        residuals,
        log_likelihood,
    }
}

/// Log-likelihood of the design targets, `-inf` for a rejected parameter vector.
pub fn log_likelihood(params: &ModelParameters, design: &DesignMatrix) -> f64 {
    if params.width() != design.width() || !params.dispersion_is_admissible() {
        return f64::NEG_INFINITY;
    }

    let mut memory = ArchMemory::new(params.dispersion_order());
    let mut total = 0.0;
    for (row, &y) in design.rows().iter().zip(design.targets()) {
        let mu = params.mean(row);
        let phi = memory.dispersion(params);
        let lp = nb_log_pmf(y, mu, phi);
        if !lp.is_finite() {
            return f64::NEG_INFINITY;
        }
        total += lp;
        memory.push(y - mu, mu);
    }
    total
}
