use chrono::{Duration, NaiveDate};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use visit_forecast::simulate::retail_series;
use visit_forecast::{
    Estimator, EstimatorConfig, ExogRow, ExogValue, FeatureConfig, ForecastConfig, ForecastError,
    Forecaster, FittedModel, Observation, VisitSeries,
};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 5, 1).unwrap()
}

fn retail() -> VisitSeries {
    retail_series(start(), 90, 110.0, 145.0, 0.005, 7).unwrap()
}

fn fitted(series: &VisitSeries) -> FittedModel {
    Estimator::default()
        .fit(series, &FeatureConfig::default())
        .unwrap()
}

fn mean_width(model: &FittedModel) -> f64 {
    let points = Forecaster::default().forecast(model, 7, None).unwrap();
    points.iter().map(|p| p.band_width()).sum::<f64>() / points.len() as f64
}

#[test]
fn test_zero_horizon_is_rejected() {
    let model = fitted(&retail());
    let err = Forecaster::default().forecast(&model, 0, None).unwrap_err();
    assert!(matches!(err, ForecastError::InvalidHorizon(0)));
}

#[test]
fn test_forecast_dates_and_bands() {
    let series = retail();
    let model = fitted(&series);
    let points = Forecaster::default().forecast(&model, 14, None).unwrap();

    assert_eq!(points.len(), 14);
    let last = series.last_date().unwrap();
    assert_eq!(points[0].date, last + Duration::days(1));
    for pair in points.windows(2) {
        assert_eq!(pair[1].date, pair[0].date + Duration::days(1));
    }

    for point in &points {
        assert!(point.mean > 0.0);
        assert!(point.dispersion > 0.0);
        assert!(point.lower >= 0.0);
        assert!(point.lower <= point.mean && point.mean <= point.upper);
        // Weekday and weekend levels stay in a plausible range
        assert!(point.mean > 60.0 && point.mean < 200.0, "mean {}", point.mean);
    }
}

#[test]
fn test_longer_horizon_extends_shorter_one() {
    let model = fitted(&retail());
    let forecaster = Forecaster::default();
    let short = forecaster.forecast(&model, 5, None).unwrap();
    let long = forecaster.forecast(&model, 12, None).unwrap();
    assert_eq!(&long[..5], short.as_slice());
}

#[test]
fn test_wider_coverage_widens_bands() {
    let model = fitted(&retail());
    let narrow = Forecaster::new(ForecastConfig { coverage: 0.5 })
        .unwrap()
        .forecast(&model, 7, None)
        .unwrap();
    let wide = Forecaster::new(ForecastConfig { coverage: 0.95 })
        .unwrap()
        .forecast(&model, 7, None)
        .unwrap();
    for (n, w) in narrow.iter().zip(&wide) {
        assert_eq!(n.mean, w.mean);
        assert!(w.band_width() > n.band_width());
    }
}

#[test]
fn test_invalid_coverage_is_rejected() {
    assert!(Forecaster::new(ForecastConfig { coverage: 1.0 }).is_err());
    assert!(Forecaster::new(ForecastConfig { coverage: 0.0 }).is_err());
}

#[test]
fn test_fallback_bands_are_wider() {
    let series = retail();
    let full = fitted(&series);
    assert!(!full.is_fallback());

    let fallback = Estimator::new(EstimatorConfig {
        max_iters: 1,
        ..EstimatorConfig::default()
    })
    .unwrap()
    .fit(&series, &FeatureConfig::default())
    .unwrap();
    assert!(fallback.is_fallback());

    assert!(mean_width(&fallback) > mean_width(&full));
}

#[test]
fn test_serialized_model_forecasts_identically() {
    let model = fitted(&retail());
    let restored = FittedModel::from_json(&model.to_json().unwrap()).unwrap();
    assert_eq!(restored, model);

    let forecaster = Forecaster::default();
    assert_eq!(
        forecaster.forecast(&restored, 10, None).unwrap(),
        forecaster.forecast(&model, 10, None).unwrap()
    );
}

fn with_promo(days: usize) -> VisitSeries {
    let base = retail_series(start(), days, 110.0, 145.0, 0.005, 21).unwrap();
    let observations = base
        .observations()
        .iter()
        .enumerate()
        .map(|(i, obs)| {
            let promo = i % 10 == 0;
            let count = if promo { obs.count + 40 } else { obs.count };
            Observation::new(obs.date, count).with_exog("promo", ExogValue::Flag(promo))
        })
        .collect();
    VisitSeries::new(observations).unwrap()
}

#[test]
fn test_future_exogenous_values() {
    let series = with_promo(120);
    let features = FeatureConfig {
        exogenous: vec!["promo".into()],
        ..FeatureConfig::default()
    };
    let model = Estimator::default().fit(&series, &features).unwrap();
    let forecaster = Forecaster::default();

    let baseline = forecaster.forecast(&model, 3, None).unwrap();
    let first = baseline[0].date;

    // A missing promo flag defaults to "off"
    let mut off: BTreeMap<NaiveDate, ExogRow> = BTreeMap::new();
    off.insert(first, ExogRow::new());
    assert_eq!(forecaster.forecast(&model, 3, Some(&off)).unwrap(), baseline);

    let mut on: BTreeMap<NaiveDate, ExogRow> = BTreeMap::new();
    on.insert(
        first,
        ExogRow::from([("promo".to_string(), ExogValue::Flag(true))]),
    );
    let promoted = forecaster.forecast(&model, 3, Some(&on)).unwrap();
    let gamma = model.coefficient("promo").unwrap();
    assert!((promoted[0].mean - baseline[0].mean - gamma).abs() < 1e-9);

    let mut wrong: BTreeMap<NaiveDate, ExogRow> = BTreeMap::new();
    wrong.insert(
        first,
        ExogRow::from([("promo".to_string(), ExogValue::Numeric(1.0))]),
    );
    assert!(matches!(
        forecaster.forecast(&model, 3, Some(&wrong)),
        Err(ForecastError::DataError(_))
    ));
}
