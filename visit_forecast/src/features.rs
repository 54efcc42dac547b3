//! Design-matrix construction
//!
//! Columns are laid out as: intercept, `lag_<k>` for each configured lag,
//! calendar indicators, then exogenous columns. The [`FeatureSchema`] learned
//! from training data travels with the fitted model so that forecast rows are
//! encoded exactly like training rows.

use crate::config::FeatureConfig;
use crate::data::{ExogRow, ExogValue, VisitSeries};
use crate::error::{ForecastError, Result};
use crate::utils::is_weekend;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const DAY_NAMES: [&str; 6] = ["tue", "wed", "thu", "fri", "sat", "sun"];

/// How an exogenous column is turned into numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExogKind {
    /// Passed through; `mean` is the training mean used for missing future values
    Numeric { mean: f64 },
    /// 1.0 when set, 0.0 otherwise
    Flag,
    /// One-hot over `levels[1..]`; `levels[0]` is the dropped baseline
    Category { levels: Vec<String> },
}

/// An exogenous column as learned from training data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExogColumn {
    pub name: String,
    pub kind: ExogKind,
}

/// Whether missing exogenous values are an error or get a default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Training rows: every configured column must be present
    Strict,
    /// Forecast rows: missing values fall back to the training mean or baseline level
    Lenient,
}

/// Column layout and encoding rules shared by training and forecasting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    lags: Vec<usize>,
    weekend: bool,
    day_of_week: bool,
    holidays: BTreeSet<NaiveDate>,
    exogenous: Vec<ExogColumn>,
    columns: Vec<String>,
}

impl FeatureSchema {
    fn new(config: &FeatureConfig, exogenous: Vec<ExogColumn>) -> Self {
        let columns = column_names(
            &config.lags,
            config.weekend,
            config.day_of_week,
            !config.holidays.is_empty(),
            &exogenous,
        );

        Self {
            lags: config.lags.clone(),
            weekend: config.weekend,
            day_of_week: config.day_of_week,
            holidays: config.holidays.iter().copied().collect(),
            exogenous,
            columns,
        }
    }

    /// Check a schema that did not come from [`FeatureBuilder`], e.g. one
    /// read back from a stored model.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.lags.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "Schema has no autoregressive lags".to_string(),
            ));
        }
        if self.lags.contains(&0) {
            return Err(ForecastError::InvalidParameter(
                "Schema lags must be at least 1".to_string(),
            ));
        }
        let unique: BTreeSet<usize> = self.lags.iter().copied().collect();
        if unique.len() != self.lags.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "Schema lags must be distinct, got {:?}",
                self.lags
            )));
        }
        for column in &self.exogenous {
            if let ExogKind::Category { levels } = &column.kind {
                if levels.is_empty() {
                    return Err(ForecastError::InvalidParameter(format!(
                        "Category column '{}' has no levels",
                        column.name
                    )));
                }
            }
        }

        let expected = column_names(
            &self.lags,
            self.weekend,
            self.day_of_week,
            !self.holidays.is_empty(),
            &self.exogenous,
        );
        if expected != self.columns {
            return Err(ForecastError::InvalidParameter(format!(
                "Schema columns {:?} do not match its layout {:?}",
                self.columns, expected
            )));
        }
        Ok(())
    }

    /// Column names in row order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of columns including the intercept
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Autoregressive lags, in column order
    pub fn lags(&self) -> &[usize] {
        &self.lags
    }

    /// Largest autoregressive lag
    pub fn max_lag(&self) -> usize {
        self.lags.iter().copied().max().unwrap_or(0)
    }

    /// Exogenous columns as learned from training data
    pub fn exogenous(&self) -> &[ExogColumn] {
        &self.exogenous
    }

    /// Encode one design row.
    ///
    /// `lagged[i]` is the count `lags()[i]` days before `date`.
    pub fn encode_row(
        &self,
        date: NaiveDate,
        lagged: &[f64],
        exog: Option<&ExogRow>,
        encoding: Encoding,
    ) -> Result<Vec<f64>> {
        if lagged.len() != self.lags.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "Expected {} lagged values, got {}",
                self.lags.len(),
                lagged.len()
            )));
        }

        let mut row = Vec::with_capacity(self.width());
        row.push(1.0);
        row.extend_from_slice(lagged);

        if self.weekend {
            row.push(indicator(is_weekend(date)));
        }
        if self.day_of_week {
            let day = date.weekday().num_days_from_monday();
            row.extend((1..=6).map(|k| indicator(day == k)));
        }
        if !self.holidays.is_empty() {
            row.push(indicator(self.holidays.contains(&date)));
        }

        for column in &self.exogenous {
            let value = exog.and_then(|values| values.get(&column.name));
            if value.is_none() && encoding == Encoding::Strict {
                return Err(ForecastError::DataError(format!(
                    "Exogenous column '{}' is missing on {}",
                    column.name, date
                )));
            }
            encode_exog(column, value, date, &mut row)?;
        }

        Ok(row)
    }
}

fn column_names(
    lags: &[usize],
    weekend: bool,
    day_of_week: bool,
    holidays: bool,
    exogenous: &[ExogColumn],
) -> Vec<String> {
    let mut columns = vec!["intercept".to_string()];
    columns.extend(lags.iter().map(|k| format!("lag_{}", k)));
    if weekend {
        columns.push("is_weekend".to_string());
    }
    if day_of_week {
        columns.extend(DAY_NAMES.iter().map(|d| format!("dow_{}", d)));
    }
    if holidays {
        columns.push("is_holiday".to_string());
    }
    for column in exogenous {
        match &column.kind {
            ExogKind::Numeric { .. } | ExogKind::Flag => columns.push(column.name.clone()),
            ExogKind::Category { levels } => columns.extend(
                levels
                    .iter()
                    .skip(1)
                    .map(|level| format!("{}={}", column.name, level)),
            ),
        }
    }
    columns
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

fn encode_exog(
    column: &ExogColumn,
    value: Option<&ExogValue>,
    date: NaiveDate,
    row: &mut Vec<f64>,
) -> Result<()> {
    match (&column.kind, value) {
        (ExogKind::Numeric { .. }, Some(ExogValue::Numeric(v))) => row.push(*v),
        (ExogKind::Numeric { mean }, None) => row.push(*mean),
        (ExogKind::Flag, Some(ExogValue::Flag(set))) => row.push(indicator(*set)),
        (ExogKind::Flag, None) => row.push(0.0),
        (ExogKind::Category { levels }, Some(ExogValue::Category(level))) => {
            row.extend(levels.iter().skip(1).map(|l| indicator(l == level)));
        }
        (ExogKind::Category { levels }, None) => {
            row.extend(std::iter::repeat(0.0).take(levels.len().saturating_sub(1)));
        }
        (_, Some(other)) => {
            return Err(ForecastError::DataError(format!(
                "Exogenous column '{}' got a {} value on {}, expected {}",
                column.name,
                other.kind_name(),
                date,
                kind_name(&column.kind)
            )));
        }
    }
    Ok(())
}

fn kind_name(kind: &ExogKind) -> &'static str {
    match kind {
        ExogKind::Numeric { .. } => "numeric",
        ExogKind::Flag => "flag",
        ExogKind::Category { .. } => "category",
    }
}

/// Design rows aligned with their target counts
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    rows: Vec<Vec<f64>>,
    targets: Vec<f64>,
    schema: FeatureSchema,
}

impl DesignMatrix {
    /// Design rows, one per target
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Counts the rows explain
    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    /// Column layout
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the matrix has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.schema.width()
    }
}

/// Turns a visit series into a design matrix
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl FeatureBuilder {
    /// Create a feature builder from a validated configuration
    pub fn new(config: FeatureConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration in use
    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Build the design matrix for `series`.
    ///
    /// Fails with `InsufficientData` when the series is not longer than
    /// `max(lag) + min_history`.
    pub fn build(&self, series: &VisitSeries) -> Result<DesignMatrix> {
        let required = self.config.required_observations();
        if series.len() < required {
            return Err(ForecastError::insufficient(required, series.len()));
        }

        let exogenous = self
            .config
            .exogenous
            .iter()
            .map(|name| learn_column(name, series))
            .collect::<Result<Vec<_>>>()?;
        let schema = FeatureSchema::new(&self.config, exogenous);

        let counts = series.counts();
        let max_lag = schema.max_lag();
        let n_rows = counts.len() - max_lag;
        let mut rows = Vec::with_capacity(n_rows);
        let mut targets = Vec::with_capacity(n_rows);

        for (t, obs) in series.observations().iter().enumerate().skip(max_lag) {
            let lagged: Vec<f64> = schema.lags().iter().map(|&k| counts[t - k]).collect();
            rows.push(schema.encode_row(obs.date, &lagged, Some(&obs.exogenous), Encoding::Strict)?);
            targets.push(counts[t]);
        }

        Ok(DesignMatrix {
            rows,
            targets,
            schema,
        })
    }
}

/// Infer a column's kind from every training observation.
fn learn_column(name: &str, series: &VisitSeries) -> Result<ExogColumn> {
    let mut values = Vec::with_capacity(series.len());
    for obs in series.observations() {
        match obs.exogenous.get(name) {
            Some(value) => values.push(value),
            None => {
                return Err(ForecastError::DataError(format!(
                    "Exogenous column '{}' is missing on {}",
                    name, obs.date
                )))
            }
        }
    }

    let kind = match values.first() {
        Some(ExogValue::Numeric(_)) => {
            let numbers = values
                .iter()
                .map(|v| match v {
                    ExogValue::Numeric(x) => Ok(*x),
                    other => Err(mixed_kinds(name, "numeric", other)),
                })
                .collect::<Result<Vec<f64>>>()?;
            ExogKind::Numeric {
                mean: numbers.iter().sum::<f64>() / numbers.len() as f64,
            }
        }
        Some(ExogValue::Flag(_)) => {
            if let Some(other) = values.iter().find(|v| !matches!(v, ExogValue::Flag(_))) {
                return Err(mixed_kinds(name, "flag", other));
            }
            ExogKind::Flag
        }
        Some(ExogValue::Category(_)) => {
            let mut levels = BTreeSet::new();
            for value in &values {
                match value {
                    ExogValue::Category(level) => {
                        levels.insert(level.clone());
                    }
                    other => return Err(mixed_kinds(name, "category", other)),
                }
            }
            ExogKind::Category {
                levels: levels.into_iter().collect(),
            }
        }
        None => {
            return Err(ForecastError::DataError(format!(
                "Exogenous column '{}' has no values",
                name
            )))
        }
    };

    Ok(ExogColumn {
        name: name.to_string(),
        kind,
    })
}

fn mixed_kinds(name: &str, expected: &str, found: &ExogValue) -> ForecastError {
    ForecastError::DataError(format!(
        "Exogenous column '{}' mixes {} and {} values",
        name,
        expected,
        found.kind_name()
    ))
}
