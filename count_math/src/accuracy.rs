//! Forecast accuracy metrics
//!
//! sMAPE is reported in percent (0–200). MASE is scaled by the in-sample
//! mean absolute seasonal difference of the training series, so values below
//! one beat a seasonal naive forecast.

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

fn check_lengths(actual: &[f64], forecast: &[f64]) -> Result<()> {
    if actual.len() != forecast.len() || actual.is_empty() {
        return Err(MathError::InvalidInput(format!(
            "Forecast and actual values must have the same non-zero length (got {} and {})",
            forecast.len(),
            actual.len()
        )));
    }
    Ok(())
}

/// Mean absolute error
pub fn mae(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    check_lengths(actual, forecast)?;
    Ok(actual
        .iter()
        .zip(forecast)
        .map(|(a, f)| (a - f).abs())
        .sum::<f64>()
        / actual.len() as f64)
}

/// Root mean squared error
pub fn rmse(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    check_lengths(actual, forecast)?;
    let mse = actual
        .iter()
        .zip(forecast)
        .map(|(a, f)| (a - f).powi(2))
        .sum::<f64>()
        / actual.len() as f64;
    Ok(mse.sqrt())
}

/// Symmetric mean absolute percentage error, in percent.
///
/// Points where both actual and forecast are zero carry no information and
/// are skipped; if every point is skipped the error is zero.
pub fn smape(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    check_lengths(actual, forecast)?;

    let (total, count) = actual
        .iter()
        .zip(forecast)
        .filter_map(|(&a, &f)| {
            let denom = (a.abs() + f.abs()) / 2.0;
            (denom > 0.0).then(|| (a - f).abs() / denom)
        })
        .fold((0.0, 0usize), |(sum, n), term| (sum + term, n + 1));

    if count == 0 {
        return Ok(0.0);
    }
    Ok(total / count as f64 * 100.0)
}

/// Mean absolute scaled error.
///
/// The scale is the mean absolute `season`-step difference of `training`.
/// When the training series is shorter than one season plus one, the
/// one-step difference is used instead. A zero scale yields `0.0` for a
/// perfect forecast and `f64::INFINITY` otherwise.
pub fn mase(actual: &[f64], forecast: &[f64], training: &[f64], season: usize) -> Result<f64> {
    check_lengths(actual, forecast)?;
    if season == 0 {
        return Err(MathError::InvalidInput(
            "Seasonal period must be at least 1".to_string(),
        ));
    }
    if training.len() < 2 {
        return Err(MathError::InsufficientData(
            "MASE needs at least two training values to build its scale".to_string(),
        ));
    }

    let lag = if training.len() > season { season } else { 1 };
    let scale = training
        .windows(lag + 1)
        .map(|w| (w[lag] - w[0]).abs())
        .sum::<f64>()
        / (training.len() - lag) as f64;

    let error = mae(actual, forecast)?;
    if scale <= f64::EPSILON {
        return Ok(if error <= f64::EPSILON { 0.0 } else { f64::INFINITY });
    }
    Ok(error / scale)
}

/// Share of actual values falling inside `[lower, upper]`.
pub fn interval_coverage(actual: &[f64], lower: &[f64], upper: &[f64]) -> Result<f64> {
    check_lengths(actual, lower)?;
    check_lengths(actual, upper)?;

    let inside = actual
        .iter()
        .zip(lower.iter().zip(upper))
        .filter(|(&a, (&lo, &hi))| a >= lo && a <= hi)
        .count();
    Ok(inside as f64 / actual.len() as f64)
}

/// Mean signed error, `forecast - actual`. Positive values over-forecast.
pub fn bias(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    check_lengths(actual, forecast)?;
    Ok(actual
        .iter()
        .zip(forecast)
        .map(|(a, f)| f - a)
        .sum::<f64>()
        / actual.len() as f64)
}

fn direction(step: f64) -> i8 {
    if step > 0.0 {
        1
    } else if step < 0.0 {
        -1
    } else {
        0
    }
}

/// Share of day-over-day steps where the forecast moves the same way as the
/// actual values. A flat step only matches another flat step.
///
/// Returns `None` when there are fewer than two points and so no steps.
pub fn directional_accuracy(actual: &[f64], forecast: &[f64]) -> Result<Option<f64>> {
    check_lengths(actual, forecast)?;
    if actual.len() < 2 {
        return Ok(None);
    }

    let matches = actual
        .windows(2)
        .zip(forecast.windows(2))
        .filter(|(a, f)| direction(a[1] - a[0]) == direction(f[1] - f[0]))
        .count();
    Ok(Some(matches as f64 / (actual.len() - 1) as f64))
}

/// Calculate accuracy metrics for a forecast vs actual values
pub fn forecast_accuracy(
    actual: &[f64],
    forecast: &[f64],
    training: &[f64],
    season: usize,
) -> Result<ForecastAccuracy> {
    Ok(ForecastAccuracy {
        mae: mae(actual, forecast)?,
        rmse: rmse(actual, forecast)?,
        smape: smape(actual, forecast)?,
        mase: mase(actual, forecast, training, season)?,
    })
}

/// Forecast accuracy metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastAccuracy {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Symmetric Mean Absolute Percentage Error (percent)
    pub smape: f64,
    /// Mean Absolute Scaled Error
    pub mase: f64,
}

impl std::fmt::Display for ForecastAccuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Forecast Accuracy Metrics:")?;
        writeln!(f, "  MAE:   {:.4}", self.mae)?;
        writeln!(f, "  RMSE:  {:.4}", self.rmse)?;
        writeln!(f, "  SMAPE: {:.4}%", self.smape)?;
        writeln!(f, "  MASE:  {:.4}", self.mase)?;
        Ok(())
    }
}
