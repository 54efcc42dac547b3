//! Daily visit-count series handling
//!
//! A [`VisitSeries`] is the validated, chronologically ordered input every
//! other component consumes. Validation happens once, at construction.

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single exogenous signal value attached to a day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExogValue {
    /// Continuous signal (temperature, ad spend, ...)
    Numeric(f64),
    /// On/off indicator (promotion running, store event, ...)
    Flag(bool),
    /// Categorical label, one-hot encoded by the feature builder
    Category(String),
}

impl ExogValue {
    /// Short name of the value kind, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExogValue::Numeric(_) => "numeric",
            ExogValue::Flag(_) => "flag",
            ExogValue::Category(_) => "category",
        }
    }
}

/// Exogenous values for one day, keyed by column name
pub type ExogRow = BTreeMap<String, ExogValue>;

/// One day of observed visits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Calendar day
    pub date: NaiveDate,
    /// Number of visits that day
    pub count: u64,
    /// Optional exogenous signals
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exogenous: ExogRow,
}

impl Observation {
    /// Create an observation without exogenous signals
    pub fn new(date: NaiveDate, count: u64) -> Self {
        Self {
            date,
            count,
            exogenous: BTreeMap::new(),
        }
    }

    /// Attach an exogenous value
    pub fn with_exog(mut self, name: impl Into<String>, value: ExogValue) -> Self {
        self.exogenous.insert(name.into(), value);
        self
    }
}

/// Chronologically ordered series of daily visit counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Observation>", into = "Vec<Observation>")]
pub struct VisitSeries {
    observations: Vec<Observation>,
}

impl VisitSeries {
    /// Create a validated series.
    ///
    /// Dates must be strictly increasing; duplicates and out-of-order days are
    /// rejected. Gaps between days are allowed. Numeric exogenous values must
    /// be finite.
    pub fn new(observations: Vec<Observation>) -> Result<Self> {
        for pair in observations.windows(2) {
            if pair[1].date == pair[0].date {
                return Err(ForecastError::DataError(format!(
                    "Duplicate date {} in series",
                    pair[1].date
                )));
            }
            if pair[1].date < pair[0].date {
                return Err(ForecastError::DataError(format!(
                    "Series is not in chronological order: {} follows {}",
                    pair[1].date, pair[0].date
                )));
            }
        }

        for obs in &observations {
            for (name, value) in &obs.exogenous {
                if let ExogValue::Numeric(v) = value {
                    if !v.is_finite() {
                        return Err(ForecastError::DataError(format!(
                            "Exogenous column '{}' has a non-finite value on {}",
                            name, obs.date
                        )));
                    }
                }
            }
        }

        Ok(Self { observations })
    }

    /// Build a series of consecutive days starting at `start`
    pub fn from_counts(start: NaiveDate, counts: &[u64]) -> Result<Self> {
        let observations = start
            .iter_days()
            .zip(counts)
            .map(|(date, &count)| Observation::new(date, count))
            .collect();
        Self::new(observations)
    }

    /// Number of observed days
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Check if the series is empty
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// All observations in date order
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Visit counts as floats, in date order
    pub fn counts(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.count as f64).collect()
    }

    /// Observation dates, in date order
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.observations.iter().map(|o| o.date).collect()
    }

    /// First observed day
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|o| o.date)
    }

    /// Last observed day
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }

    /// Contiguous sub-series `[start, end)`
    pub fn slice(&self, start: usize, end: usize) -> Result<VisitSeries> {
        if start > end || end > self.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "Slice {}..{} is out of bounds for a series of length {}",
                start,
                end,
                self.len()
            )));
        }
        Ok(Self {
            observations: self.observations[start..end].to_vec(),
        })
    }

    /// Exogenous values keyed by date, for passing known future signals
    pub fn exog_by_date(&self) -> BTreeMap<NaiveDate, ExogRow> {
        self.observations
            .iter()
            .filter(|o| !o.exogenous.is_empty())
            .map(|o| (o.date, o.exogenous.clone()))
            .collect()
    }
}

impl TryFrom<Vec<Observation>> for VisitSeries {
    type Error = ForecastError;

    fn try_from(observations: Vec<Observation>) -> Result<Self> {
        Self::new(observations)
    }
}

impl From<VisitSeries> for Vec<Observation> {
    fn from(series: VisitSeries) -> Self {
        series.observations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_rejects_duplicates_and_disorder() {
        let dup = vec![Observation::new(day(1), 3), Observation::new(day(1), 4)];
        assert!(matches!(VisitSeries::new(dup), Err(ForecastError::DataError(_))));

        let disorder = vec![Observation::new(day(2), 3), Observation::new(day(1), 4)];
        assert!(matches!(
            VisitSeries::new(disorder),
            Err(ForecastError::DataError(_))
        ));
    }

    #[test]
    fn test_from_counts_uses_consecutive_days() {
        let series = VisitSeries::from_counts(day(30), &[1, 2, 3]).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.last_date(), NaiveDate::from_ymd_opt(2024, 4, 1));
        assert_eq!(series.counts(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_slice_bounds() {
        let series = VisitSeries::from_counts(day(1), &[5, 6, 7, 8]).unwrap();
        assert_eq!(series.slice(1, 3).unwrap().counts(), vec![6.0, 7.0]);
        assert!(series.slice(2, 5).is_err());
    }

    #[test]
    fn test_non_finite_exog_is_rejected() {
        let obs = Observation::new(day(1), 3).with_exog("temp", ExogValue::Numeric(f64::NAN));
        assert!(VisitSeries::new(vec![obs]).is_err());
    }
}
