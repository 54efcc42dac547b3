//! Negative-binomial likelihood and normal quantiles
//!
//! The negative binomial is parameterized by its mean `mu` and a dispersion
//! `phi` so that `Var[Y] = mu + phi * mu^2`. With `phi > 0` the variance always
//! exceeds the mean, which is what separates it from a Poisson count model.

use crate::{MathError, Result};
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::gamma::ln_gamma;

/// Smallest conditional mean a count model may produce.
pub const MEAN_FLOOR: f64 = 1e-6;

/// Smallest conditional dispersion a count model may produce.
pub const DISPERSION_FLOOR: f64 = 1e-6;

/// Log-probability of observing `y` under NB(mean = `mu`, dispersion = `phi`).
///
/// Returns `f64::NEG_INFINITY` for negative or non-finite counts and for
/// non-finite or non-positive `mu`/`phi`, so a caller summing log-likelihoods
/// sees the whole parameter vector rejected instead of a panic.
pub fn nb_log_pmf(y: f64, mu: f64, phi: f64) -> f64 {
    if !(y.is_finite() && mu.is_finite() && phi.is_finite()) || y < 0.0 || mu <= 0.0 || phi <= 0.0
    {
        return f64::NEG_INFINITY;
    }

    let r = 1.0 / phi;
    let phi_mu = phi * mu;
    let log1p_phi_mu = phi_mu.ln_1p();

    // r * ln(r / (r + mu)) = -ln(1 + phi*mu) / phi
    // y * ln(mu / (r + mu)) = y * (ln(phi*mu) - ln(1 + phi*mu))
    let value = ln_gamma(y + r) - ln_gamma(y + 1.0) - ln_gamma(r) - r * log1p_phi_mu
        + y * (phi_mu.ln() - log1p_phi_mu);

    if value.is_finite() {
        value
    } else {
        f64::NEG_INFINITY
    }
}

/// Variance of NB(mean = `mu`, dispersion = `phi`).
pub fn nb_variance(mu: f64, phi: f64) -> f64 {
    mu + phi * mu * mu
}

/// Standard normal quantile.
pub fn normal_quantile(p: f64) -> Result<f64> {
    if !(p > 0.0 && p < 1.0) {
        return Err(MathError::InvalidInput(format!(
            "Quantile probability must lie strictly between 0 and 1, got {}",
            p
        )));
    }
    let normal = Normal::new(0.0, 1.0)
        .map_err(|err| MathError::CalculationError(err.to_string()))?;
    Ok(normal.inverse_cdf(p))
}

/// Two-sided z multiplier for a central interval with the given coverage.
///
/// A coverage of `0.8` yields the P10/P90 multiplier (≈ 1.2816).
pub fn central_z(coverage: f64) -> Result<f64> {
    if !(coverage > 0.0 && coverage < 1.0) {
        return Err(MathError::InvalidInput(format!(
            "Interval coverage must lie strictly between 0 and 1, got {}",
            coverage
        )));
    }
    normal_quantile(0.5 + coverage / 2.0)
}
