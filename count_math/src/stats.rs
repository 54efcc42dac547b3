//! Summary statistics used to seed and sanity-check count models

use crate::distributions::DISPERSION_FLOOR;
use crate::{MathError, Result};

/// Arithmetic mean
pub fn mean(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot take the mean of an empty series".to_string(),
        ));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance (divides by `n`)
pub fn variance(values: &[f64]) -> Result<f64> {
    let m = mean(values)?;
    Ok(values.iter().map(|&v| (v - m).powi(2)).sum::<f64>() / values.len() as f64)
}

/// Sample autocorrelation at the given lag.
///
/// A constant series has no defined autocorrelation; zero is returned so
/// seeding heuristics can treat it as "no persistence".
pub fn autocorrelation(values: &[f64], lag: usize) -> Result<f64> {
    if lag == 0 {
        return Err(MathError::InvalidInput(
            "Autocorrelation lag must be at least 1".to_string(),
        ));
    }
    if values.len() <= lag + 1 {
        return Err(MathError::InsufficientData(format!(
            "Need more than {} values for a lag-{} autocorrelation, have {}",
            lag + 1,
            lag,
            values.len()
        )));
    }

    let m = mean(values)?;
    let denominator: f64 = values.iter().map(|&v| (v - m).powi(2)).sum();
    if denominator <= f64::EPSILON {
        return Ok(0.0);
    }

    let numerator: f64 = values
        .windows(lag + 1)
        .map(|w| (w[lag] - m) * (w[0] - m))
        .sum();

    Ok(numerator / denominator)
}

/// Least-squares AR fit on a single lag: `y_t = c + phi * y_{t-lag}`.
///
/// The slope is the lagged ratio `sum(y_t * y_{t-lag}) / sum(y_{t-lag}^2)`
/// clipped to `[0, max_phi]`, the intercept `mean(y_t) - phi * mean(y_{t-lag})`.
/// Returns `(intercept, phi)`.
pub fn lag_regression(values: &[f64], lag: usize, max_phi: f64) -> Result<(f64, f64)> {
    if lag == 0 {
        return Err(MathError::InvalidInput(
            "Regression lag must be at least 1".to_string(),
        ));
    }
    if values.len() < lag + 2 {
        return Err(MathError::InsufficientData(format!(
            "Need at least {} values for a lag-{} fit, have {}",
            lag + 2,
            lag,
            values.len()
        )));
    }

    let current = &values[lag..];
    let lagged = &values[..values.len() - lag];

    let cross: f64 = current.iter().zip(lagged).map(|(a, b)| a * b).sum();
    let energy: f64 = lagged.iter().map(|b| b * b).sum();
    let phi = (cross / energy.max(1e-6)).clamp(0.0, max_phi);
    let intercept = mean(current)? - phi * mean(lagged)?;

    Ok((intercept, phi))
}

/// Method-of-moments NB dispersion: `max((s^2 - m) / m^2, floor)`.
///
/// Equidispersed or underdispersed data maps to the floor rather than a
/// negative dispersion.
pub fn moment_dispersion(values: &[f64]) -> Result<f64> {
    let m = mean(values)?;
    let v = variance(values)?;
    if m <= f64::EPSILON {
        return Ok(DISPERSION_FLOOR);
    }
    let phi = (v - m) / (m * m);
    Ok(if phi.is_finite() {
        phi.max(DISPERSION_FLOOR)
    } else {
        DISPERSION_FLOOR
    })
}
