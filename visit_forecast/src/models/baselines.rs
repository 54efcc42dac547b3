//! Naive reference forecasts the count model must beat

use crate::error::{ForecastError, Result};
use count_math::moving_averages::SimpleMovingAverage;
use std::fmt::Debug;

/// A forecast rule that needs nothing but the history of counts
pub trait Baseline: Debug {
    /// Short identifier used in backtest reports
    fn name(&self) -> &str;

    /// Forecast `horizon` values following `history`
    fn forecast(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>>;
}

fn check_request(name: &str, history: &[f64], needed: usize, horizon: usize) -> Result<()> {
    if horizon == 0 {
        return Err(ForecastError::InvalidHorizon(0));
    }
    if history.len() < needed {
        return Err(ForecastError::DataError(format!(
            "{} baseline needs at least {} observations, got {}",
            name,
            needed,
            history.len()
        )));
    }
    Ok(())
}

/// Flat forecast at the mean of the last `window` observations
#[derive(Debug, Clone)]
pub struct MovingAverageBaseline {
    name: String,
    window: usize,
}

impl MovingAverageBaseline {
    /// Create a new moving-average baseline
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(ForecastError::InvalidParameter(
                "Window size must be positive".to_string(),
            ));
        }
        Ok(Self {
            name: format!("ma{}", window),
            window,
        })
    }
}

impl Baseline for MovingAverageBaseline {
    fn name(&self) -> &str {
        &self.name
    }

    fn forecast(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>> {
        check_request(&self.name, history, self.window, horizon)?;
        let level = SimpleMovingAverage::from_history(self.window, history)?.value()?;
        Ok(vec![level; horizon])
    }
}

/// Repeats the last observation
#[derive(Debug, Clone, Default)]
pub struct NaiveBaseline;

impl Baseline for NaiveBaseline {
    fn name(&self) -> &str {
        "naive"
    }

    fn forecast(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>> {
        check_request(self.name(), history, 1, horizon)?;
        let last = history[history.len() - 1];
        Ok(vec![last; horizon])
    }
}

/// Repeats the last full season
#[derive(Debug, Clone)]
pub struct SeasonalNaiveBaseline {
    name: String,
    period: usize,
}

impl SeasonalNaiveBaseline {
    /// Create a new seasonal naive baseline
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(ForecastError::InvalidParameter(
                "Seasonal period must be positive".to_string(),
            ));
        }
        Ok(Self {
            name: format!("seasonal_naive{}", period),
            period,
        })
    }
}

impl Baseline for SeasonalNaiveBaseline {
    fn name(&self) -> &str {
        &self.name
    }

    fn forecast(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>> {
        check_request(&self.name, history, self.period, horizon)?;
        let season = &history[history.len() - self.period..];
        Ok((0..horizon).map(|h| season[h % self.period]).collect())
    }
}
