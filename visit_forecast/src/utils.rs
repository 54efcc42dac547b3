//! Utility functions for the visit_forecast crate

use crate::data::VisitSeries;
use crate::error::{ForecastError, Result};
use chrono::{Datelike, NaiveDate, Weekday};

/// Split a series into a training prefix and a holdout of `test_len` days
pub fn holdout_split(series: &VisitSeries, test_len: usize) -> Result<(VisitSeries, VisitSeries)> {
    if test_len == 0 || test_len >= series.len() {
        return Err(ForecastError::InvalidParameter(format!(
            "Holdout of {} days does not fit a series of {} days",
            test_len,
            series.len()
        )));
    }
    let split = series.len() - test_len;
    Ok((series.slice(0, split)?, series.slice(split, series.len())?))
}

/// The `horizon` consecutive days following `last`
pub fn future_dates(last: NaiveDate, horizon: usize) -> Result<Vec<NaiveDate>> {
    let mut dates = Vec::with_capacity(horizon);
    let mut current = last;

    for _ in 0..horizon {
        current = current.succ_opt().ok_or_else(|| {
            ForecastError::InvalidParameter(format!("Date overflow after {}", current))
        })?;
        dates.push(current);
    }

    Ok(dates)
}

/// Saturday or Sunday
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}
