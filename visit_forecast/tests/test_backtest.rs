use chrono::{Duration, NaiveDate};
use pretty_assertions::assert_eq;
use visit_forecast::simulate::retail_series;
use visit_forecast::{
    BacktestConfig, BacktestEvaluator, BacktestReport, Estimator, FeatureConfig, ForecastError, Forecaster,
    VisitSeries, WindowKind,
};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 9, 4).unwrap()
}

fn retail(days: usize) -> VisitSeries {
    retail_series(start(), days, 110.0, 145.0, 0.005, 5).unwrap()
}

fn evaluator(config: BacktestConfig) -> BacktestEvaluator {
    BacktestEvaluator::new(
        FeatureConfig::default(),
        Estimator::default(),
        Forecaster::default(),
        config,
    )
    .unwrap()
}

#[test]
fn test_origins_step_by_horizon() {
    let evaluator = evaluator(BacktestConfig::default());
    assert_eq!(evaluator.initial_train(), 45);
    assert_eq!(evaluator.origins(90).unwrap(), vec![45, 52, 59, 66, 73, 80]);
    // The last origin needs a full horizon of test days
    assert_eq!(evaluator.origins(86).unwrap(), vec![45, 52, 59, 66, 73]);
}

#[test]
fn test_max_folds_keeps_most_recent() {
    let evaluator = evaluator(BacktestConfig {
        max_folds: Some(4),
        ..BacktestConfig::default()
    });
    assert_eq!(evaluator.origins(90).unwrap(), vec![59, 66, 73, 80]);
}

#[test]
fn test_custom_step_and_initial_train() {
    let evaluator = evaluator(BacktestConfig {
        horizon: 3,
        step: Some(10),
        initial_train: Some(50),
        ..BacktestConfig::default()
    });
    assert_eq!(evaluator.origins(80).unwrap(), vec![50, 60, 70]);
}

#[test]
fn test_too_few_folds() {
    let err = evaluator(BacktestConfig::default())
        .evaluate(&retail(60))
        .unwrap_err();
    match err {
        ForecastError::InsufficientFolds {
            required,
            available,
        } => {
            assert_eq!(required, 3);
            assert_eq!(available, 2);
        }
        other => panic!("expected InsufficientFolds, got {:?}", other),
    }
}

#[test]
fn test_initial_train_below_threshold_is_rejected() {
    let evaluator = evaluator(BacktestConfig {
        initial_train: Some(30),
        ..BacktestConfig::default()
    });
    assert!(matches!(
        evaluator.origins(90),
        Err(ForecastError::InvalidParameter(_))
    ));
}

#[test]
fn test_zero_horizon_is_rejected() {
    let result = BacktestEvaluator::new(
        FeatureConfig::default(),
        Estimator::default(),
        Forecaster::default(),
        BacktestConfig {
            horizon: 0,
            ..BacktestConfig::default()
        },
    );
    assert!(matches!(result, Err(ForecastError::InvalidHorizon(0))));
}

#[test]
fn test_expanding_backtest_report() {
    let series = retail(90);
    let report = evaluator(BacktestConfig::default())
        .evaluate(&series)
        .unwrap();

    assert_eq!(report.n_folds(), 6);
    let names: Vec<&str> = report.baselines.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["ma7", "naive", "seasonal_naive7"]);

    for (i, fold) in report.folds.iter().enumerate() {
        assert_eq!(fold.index, i);
        assert_eq!(fold.train.start, start());
        assert_eq!(fold.train.len, 45 + 7 * i);
        assert_eq!(fold.test.len, 7);
        assert_eq!(fold.test.start, fold.train.end + Duration::days(1));
        assert_eq!(fold.baselines.len(), 3);

        let coverage = fold.model.coverage.unwrap();
        assert!((0.0..=1.0).contains(&coverage));
        assert!(fold.model.smape >= 0.0 && fold.model.smape <= 200.0);
        assert!(fold.baselines.values().all(|m| m.coverage.is_none()));

        // A seven-day window always holds one weekend
        assert!(fold.model.weekend_smape.is_some());
        let direction = fold.model.directional_accuracy.unwrap();
        assert!((0.0..=1.0).contains(&direction));
        assert!(fold.model.bias.is_finite());
    }

    let gate = &report.gate;
    assert_eq!(gate.baseline, "ma7");
    assert_eq!(gate.margin, 0.08);
    assert_eq!(gate.model_smape, report.model.smape);
    assert_eq!(gate.baseline_smape, report.baselines["ma7"].smape);
    let lift = (gate.baseline_smape - gate.model_smape) / gate.baseline_smape;
    assert!((gate.lift.unwrap() - lift).abs() < 1e-12);
    assert_eq!(gate.passed, lift >= gate.margin);
    assert!(report.fallback_folds() <= report.n_folds());

    let coverage = &report.coverage_gate;
    assert_eq!(coverage.minimum, 0.85);
    assert_eq!(coverage.coverage, report.model.coverage);
    assert_eq!(coverage.passed, coverage.coverage.unwrap() >= 0.85);
    assert!(report.model.weekend_smape.is_some());
}

#[test]
fn test_sliding_window_keeps_train_length() {
    let report = evaluator(BacktestConfig {
        window: WindowKind::Sliding,
        max_folds: Some(3),
        ..BacktestConfig::default()
    })
    .evaluate(&retail(90))
    .unwrap();

    assert_eq!(report.n_folds(), 3);
    for fold in &report.folds {
        assert_eq!(fold.train.len, 45);
        assert_eq!(fold.test.start, fold.train.end + Duration::days(1));
    }
    assert!(report.folds[0].train.start < report.folds[2].train.start);
}

#[test]
fn test_report_serializes() {
    let report = evaluator(BacktestConfig {
        max_folds: Some(3),
        ..BacktestConfig::default()
    })
    .evaluate(&retail(90))
    .unwrap();
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"gate\""));
    assert!(json.contains("\"coverage_gate\""));
    assert!(json.contains("seasonal_naive7"));
    assert_eq!(serde_json::from_str::<BacktestReport>(&json).unwrap(), report);
}

#[test]
fn test_flat_series_report_round_trips() {
    // A flat history has no MASE scale; misses must not poison the report
    let series = VisitSeries::from_counts(start(), &[120; 70]).unwrap();
    let report = evaluator(BacktestConfig {
        max_folds: Some(3),
        ..BacktestConfig::default()
    })
    .evaluate(&series)
    .unwrap();

    assert_eq!(report.baselines["naive"].mase, Some(0.0));
    assert_eq!(report.baselines["naive"].smape, 0.0);

    let json = serde_json::to_string(&report).unwrap();
    assert_eq!(serde_json::from_str::<BacktestReport>(&json).unwrap(), report);
}
