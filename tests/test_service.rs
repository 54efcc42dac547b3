use chrono::NaiveDate;
use store_pulse::{DatasetId, ForecastService, ModelRegistry, RegistryError};
use visit_forecast::simulate::retail_series;
use visit_forecast::{CancelToken, EngineConfig, FallbackReason, ForecastError, VisitSeries};

fn series(days: usize) -> VisitSeries {
    let start = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
    retail_series(start, days, 110.0, 145.0, 0.005, 99).unwrap()
}

#[test]
fn test_train_then_forecast() {
    let service = ForecastService::new(EngineConfig::default()).unwrap();
    let store = DatasetId::new("downtown");
    let data = series(90);

    let entry = service.train(&store, &data).unwrap();
    assert_eq!(entry.version, 1);
    assert_eq!(entry.model.n_obs(), 90);

    let points = service.forecast(&store, 7, None).unwrap();
    assert_eq!(points.len(), 7);
    assert!(points[0].date > data.last_date().unwrap());
    assert!(points.iter().all(|p| p.lower >= 0.0 && p.lower <= p.upper));
}

#[test]
fn test_forecast_without_model() {
    let service = ForecastService::new(EngineConfig::default()).unwrap();
    let err = service
        .forecast(&DatasetId::new("nowhere"), 7, None)
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
    assert!(err.to_string().contains("train one first"));
}

#[test]
fn test_engine_errors_pass_through() {
    let service = ForecastService::new(EngineConfig::default()).unwrap();
    let store = DatasetId::new("new-store");

    let err = service.train(&store, &series(20)).unwrap_err();
    assert!(err.to_string().contains("need 25 more days of data"));
    assert!(matches!(
        err,
        RegistryError::Forecast(ForecastError::InsufficientData { .. })
    ));
    assert!(service.registry().get(&store).unwrap().is_none());

    service.train(&store, &series(60)).unwrap();
    assert!(matches!(
        service.forecast(&store, 0, None),
        Err(RegistryError::Forecast(ForecastError::InvalidHorizon(0)))
    ));
}

#[test]
fn test_cancelled_training_registers_fallback() {
    let service = ForecastService::new(EngineConfig::default()).unwrap();
    let store = DatasetId::new("uptown");
    let token = CancelToken::new();
    token.cancel();

    let entry = service
        .train_with_cancel(&store, &series(60), token)
        .unwrap();
    assert_eq!(entry.model.fallback_reason(), Some(FallbackReason::Cancelled));
    assert!(service.forecast(&store, 3, None).is_ok());
}

#[test]
fn test_retrain_and_invalidate() {
    let service = ForecastService::new(EngineConfig::default()).unwrap();
    let store = DatasetId::new("mall");
    service.train(&store, &series(60)).unwrap();
    let second = service.train(&store, &series(75)).unwrap();
    assert_eq!(second.version, 2);
    assert_eq!(service.registry().archive(&store).unwrap().len(), 1);

    service.invalidate(&store).unwrap();
    assert!(service.forecast(&store, 7, None).is_err());
}

#[test]
fn test_forget_with_bounded_registry() {
    let registry = ModelRegistry::with_archive_limit(1);
    let service = ForecastService::with_registry(EngineConfig::default(), registry).unwrap();
    let store = DatasetId::new("closing");
    let data = series(60);

    for _ in 0..3 {
        service.train(&store, &data).unwrap();
    }
    assert_eq!(service.registry().archive(&store).unwrap().len(), 1);

    assert_eq!(service.forget(&store).unwrap().unwrap().version, 3);
    assert!(matches!(
        service.forecast(&store, 7, None),
        Err(RegistryError::NotFound(_))
    ));
    assert_eq!(service.registry().fit_locks().unwrap(), 0);
}

#[test]
fn test_backtest() {
    let service = ForecastService::new(EngineConfig::default()).unwrap();
    let report = service.backtest(&series(90)).unwrap();
    assert_eq!(report.n_folds(), 6);
    assert_eq!(report.gate.baseline, "ma7");
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = EngineConfig::from_toml_str("[forecast]\ncoverage = 0.9").unwrap();
    assert!(ForecastService::new(config).is_ok());

    let mut config = EngineConfig::default();
    config.features.lags.clear();
    assert!(matches!(
        ForecastService::new(config),
        Err(RegistryError::Forecast(ForecastError::InvalidParameter(_)))
    ));
}
