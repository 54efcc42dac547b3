//! Seeded synthetic visit series
//!
//! Negative-binomial draws use the Gamma-Poisson mixture: `lambda ~
//! Gamma(shape = 1/phi, scale = phi * mu)` then `y ~ Poisson(lambda)`.

use crate::data::VisitSeries;
use crate::error::{ForecastError, Result};
use crate::models::{ArchMemory, ModelParameters};
use crate::utils::is_weekend;
use chrono::NaiveDate;
use count_math::{DISPERSION_FLOOR, MEAN_FLOOR};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma, Poisson};

const BURN_IN: usize = 200;

/// Known NB-INGARCH process without exogenous terms
#[derive(Debug, Clone, PartialEq)]
pub struct IngarchProcess {
    /// Lag of each entry of `params.ar`
    pub lags: Vec<usize>,
    pub params: ModelParameters,
}

impl IngarchProcess {
    fn validate(&self) -> Result<()> {
        if self.lags.len() != self.params.ar.len() || self.lags.contains(&0) {
            return Err(ForecastError::InvalidParameter(
                "Each AR coefficient needs a lag of at least 1".to_string(),
            ));
        }
        if !self.params.exogenous.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "Simulation does not take exogenous coefficients".to_string(),
            ));
        }
        let persistence: f64 = self.params.ar.iter().sum();
        if !(self.params.intercept > 0.0 && persistence < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Process is not stationary (intercept {}, AR sum {})",
                self.params.intercept, persistence
            )));
        }
        if !self.params.dispersion_is_admissible() {
            return Err(ForecastError::InvalidParameter(
                "Dispersion coefficients must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Unconditional mean `b0 / (1 - sum b_i)`
    pub fn stationary_mean(&self) -> f64 {
        self.params.intercept / (1.0 - self.params.ar.iter().sum::<f64>())
    }
}

/// Draw one negative-binomial count with mean `mu` and dispersion `phi`
pub fn sample_nb(rng: &mut StdRng, mu: f64, phi: f64) -> Result<u64> {
    let mu = mu.max(MEAN_FLOOR);
    let phi = phi.max(DISPERSION_FLOOR);
    let gamma = Gamma::new(1.0 / phi, phi * mu)
        .map_err(|err| ForecastError::InvalidParameter(format!("Gamma draw: {}", err)))?;
    let lambda: f64 = gamma.sample(rng);
    if lambda <= 0.0 {
        return Ok(0);
    }
    let poisson = Poisson::new(lambda)
        .map_err(|err| ForecastError::InvalidParameter(format!("Poisson draw: {}", err)))?;
    let draw: f64 = poisson.sample(rng);
    Ok(draw as u64)
}

/// Simulate `n` days of an NB-INGARCH process starting at `start`.
///
/// The first draws are discarded as burn-in so the series starts near
/// stationarity.
pub fn simulate_ingarch(
    process: &IngarchProcess,
    n: usize,
    start: NaiveDate,
    seed: u64,
) -> Result<VisitSeries> {
    process.validate()?;
    let mut rng = StdRng::seed_from_u64(seed);
    let max_lag = process.lags.iter().copied().max().unwrap_or(0);

    let mut history = vec![process.stationary_mean(); max_lag];
    let mut memory = ArchMemory::new(process.params.dispersion_order());
    let mut counts = Vec::with_capacity(n);

    for t in 0..BURN_IN + n {
        let mut row = Vec::with_capacity(1 + process.lags.len());
        row.push(1.0);
        row.extend(process.lags.iter().map(|&k| history[history.len() - k]));

        let mu = process.params.mean(&row);
        let phi = memory.dispersion(&process.params);
        let y = sample_nb(&mut rng, mu, phi)?;

        memory.push(y as f64 - mu, mu);
        history.push(y as f64);
        if t >= BURN_IN {
            counts.push(y);
        }
    }

    VisitSeries::from_counts(start, &counts)
}

/// Retail-style series: independent NB draws whose mean depends on the weekend
pub fn retail_series(
    start: NaiveDate,
    days: usize,
    weekday_mean: f64,
    weekend_mean: f64,
    dispersion: f64,
    seed: u64,
) -> Result<VisitSeries> {
    let mut rng = StdRng::seed_from_u64(seed);
    let counts = start
        .iter_days()
        .take(days)
        .map(|date| {
            let mu = if is_weekend(date) {
                weekend_mean
            } else {
                weekday_mean
            };
            sample_nb(&mut rng, mu, dispersion)
        })
        .collect::<Result<Vec<u64>>>()?;
    VisitSeries::from_counts(start, &counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use count_math::stats;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
    }

    #[test]
    fn test_nb_draws_are_overdispersed() {
        let mut rng = StdRng::seed_from_u64(7);
        let draws: Vec<f64> = (0..20_000)
            .map(|_| sample_nb(&mut rng, 40.0, 0.1).unwrap() as f64)
            .collect();
        let mean = stats::mean(&draws).unwrap();
        let var = stats::variance(&draws).unwrap();
        // Var = 40 + 0.1 * 1600 = 200
        assert!((mean - 40.0).abs() < 1.0, "mean {}", mean);
        assert!(var > 160.0 && var < 240.0, "variance {}", var);
    }

    #[test]
    fn test_simulation_is_seeded() {
        let process = IngarchProcess {
            lags: vec![1],
            params: ModelParameters {
                intercept: 20.0,
                ar: vec![0.5],
                exogenous: vec![],
                alpha0: 0.05,
                arch: vec![0.02],
            },
        };
        let a = simulate_ingarch(&process, 50, start(), 11).unwrap();
        let b = simulate_ingarch(&process, 50, start(), 11).unwrap();
        let c = simulate_ingarch(&process, 50, start(), 12).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 50);
    }

    #[test]
    fn test_rejects_explosive_process() {
        let process = IngarchProcess {
            lags: vec![1],
            params: ModelParameters {
                intercept: 5.0,
                ar: vec![1.1],
                exogenous: vec![],
                alpha0: 0.05,
                arch: vec![],
            },
        };
        assert!(simulate_ingarch(&process, 10, start(), 1).is_err());
    }

    #[test]
    fn test_retail_weekends_are_busier() {
        let series = retail_series(start(), 140, 110.0, 145.0, 0.005, 3).unwrap();
        let (weekend, weekday): (Vec<_>, Vec<_>) = series
            .observations()
            .iter()
            .partition(|o| is_weekend(o.date));
        let avg = |obs: &[&crate::data::Observation]| {
            obs.iter().map(|o| o.count as f64).sum::<f64>() / obs.len() as f64
        };
        assert!(avg(&weekend) > avg(&weekday) + 20.0);
    }
}
