use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use visit_forecast::simulate::retail_series;
use visit_forecast::{
    Estimator, EstimatorConfig, FeatureConfig, FittedModel, ForecastError, Forecaster,
};

fn model() -> FittedModel {
    let start = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
    let series = retail_series(start, 60, 110.0, 145.0, 0.005, 31).unwrap();
    // One iteration forces the AR(1) fallback, which is all these tests need
    Estimator::new(EstimatorConfig {
        max_iters: 1,
        retry: false,
        dispersion_order: 2,
        ..EstimatorConfig::default()
    })
    .unwrap()
    .fit(&series, &FeatureConfig::default())
    .unwrap()
}

fn assert_rejected(edit: impl FnOnce(&mut Value)) {
    let mut value = serde_json::to_value(model()).unwrap();
    edit(&mut value);
    let text = value.to_string();

    match FittedModel::from_json(&text) {
        Err(ForecastError::InvalidParameter(_)) => {}
        other => panic!("expected InvalidParameter, got {:?}", other),
    }
    // Plain serde goes through the same checks
    assert!(serde_json::from_str::<FittedModel>(&text).is_err());
}

#[test]
fn test_stored_model_round_trips() {
    let model = model();
    assert!(model.validate().is_ok());
    assert_eq!(model.state().recent_residuals.len(), 2);
    assert_eq!(model.state().recent_means.len(), 2);

    let restored = FittedModel::from_json(&model.to_json().unwrap()).unwrap();
    assert_eq!(restored, model);
    assert!(Forecaster::default().forecast(&restored, 7, None).is_ok());
}

#[test]
fn test_coefficient_lookup_by_column() {
    let model = model();
    let params = model.params();
    assert_eq!(model.coefficient("intercept"), Some(params.intercept));
    assert_eq!(model.coefficient("lag_7"), Some(params.ar[1]));
    assert_eq!(model.coefficient("is_weekend"), Some(params.exogenous[0]));
    assert_eq!(model.coefficient("lag_3"), None);
}

#[test]
fn test_negative_dispersion_is_rejected() {
    assert_rejected(|v| v["params"]["alpha0"] = json!(-0.5));
    assert_rejected(|v| v["params"]["arch"][1] = json!(-0.01));
}

#[test]
fn test_zero_lag_is_rejected() {
    assert_rejected(|v| v["schema"]["lags"][0] = json!(0));
    assert_rejected(|v| v["schema"]["lags"] = json!([]));
}

#[test]
fn test_width_mismatch_is_rejected() {
    assert_rejected(|v| {
        v["params"]["exogenous"]
            .as_array_mut()
            .unwrap()
            .push(json!(0.5))
    });
    assert_rejected(|v| v["params"]["ar"] = json!([0.3]));
    assert_rejected(|v| v["schema"]["columns"][1] = json!("lag_2"));
}

#[test]
fn test_short_state_is_rejected() {
    assert_rejected(|v| v["state"]["recent_counts"] = json!([101.0, 99.0, 120.0]));
    assert_rejected(|v| v["state"]["recent_residuals"] = json!([0.5]));
    assert_rejected(|v| v["state"]["recent_means"] = json!([110.0, 0.0]));
}

#[test]
fn test_inconsistent_flags_are_rejected() {
    assert_rejected(|v| v["converged"] = json!(true));
    assert_rejected(|v| v["fallback_reason"] = Value::Null);
}

#[test]
fn test_malformed_json_is_a_serialization_error() {
    assert!(matches!(
        FittedModel::from_json("{\"params\": 3"),
        Err(ForecastError::SerializationError(_))
    ));
}
