use chrono::NaiveDate;
use count_math::accuracy::smape;
use count_math::stats::{mean, variance};
use visit_forecast::models::{Baseline, MovingAverageBaseline};
use visit_forecast::simulate::retail_series;
use visit_forecast::utils::holdout_split;
use visit_forecast::{
    BacktestEvaluator, EngineConfig, Estimator, FeatureBuilder, Forecaster, FittedModel,
};

const CONFIG: &str = r#"
[features]
lags = [1, 7, 14]
min_history = 30

[estimator]
dispersion_order = 1

[forecast]
coverage = 0.8

[backtest]
horizon = 7
min_folds = 3
"#;

#[test]
fn test_retail_pipeline() {
    let config = EngineConfig::from_toml_str(CONFIG).unwrap();
    let start = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
    let series = retail_series(start, 90, 110.0, 145.0, 0.005, 2024).unwrap();
    let (train, test) = holdout_split(&series, 7).unwrap();

    // The fixture must be overdispersed, or an NB model has nothing to add.
    // Weekday/weekend levels plus NB noise give a variance-to-mean ratio near 3.7.
    let counts = series.counts();
    let ratio = variance(&counts).unwrap() / mean(&counts).unwrap();
    assert!((2.0..=5.5).contains(&ratio), "variance/mean {}", ratio);

    // Features
    let design = FeatureBuilder::new(config.features.clone())
        .unwrap()
        .build(&train)
        .unwrap();
    assert_eq!(design.len(), train.len() - 14);

    // Fit
    let estimator = Estimator::new(config.estimator.clone()).unwrap();
    let model = estimator.fit(&train, &config.features).unwrap();
    assert!(model.params().alpha0 > 0.0);
    assert_eq!(model.n_obs(), 83);

    // Persist and forecast
    let model = FittedModel::from_json(&model.to_json().unwrap()).unwrap();
    let forecaster = Forecaster::new(config.forecast.clone()).unwrap();
    let points = forecaster.forecast(&model, 7, None).unwrap();
    assert_eq!(points[0].date, test.first_date().unwrap());

    let actual = test.counts();
    let means: Vec<f64> = points.iter().map(|p| p.mean).collect();
    let model_smape = smape(&actual, &means).unwrap();

    let ma = MovingAverageBaseline::new(7)
        .unwrap()
        .forecast(&train.counts(), 7)
        .unwrap();
    let ma_smape = smape(&actual, &ma).unwrap();

    assert!(model_smape < 30.0, "model sMAPE {}", model_smape);
    assert!(ma_smape.is_finite());

    // Backtest over the full series
    let report = BacktestEvaluator::new(config.features, estimator, forecaster, config.backtest)
        .unwrap()
        .evaluate(&series)
        .unwrap();
    assert_eq!(report.n_folds(), 6);
    assert!(report.model.smape < 30.0);
    let coverage = report.model.coverage.unwrap();
    assert!((0.0..=1.0).contains(&coverage));
}
