use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use visit_forecast::{ExogValue, ForecastError, Observation, VisitSeries};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

#[test]
fn test_series_deserializes_from_json() {
    let text = r#"[
        {"date": "2024-06-01", "count": 120, "exogenous": {"promo": true, "temp": 21.5, "weather": "sun"}},
        {"date": "2024-06-02", "count": 98},
        {"date": "2024-06-04", "count": 105, "exogenous": {"temp": 19}}
    ]"#;
    let series: VisitSeries = serde_json::from_str(text).unwrap();

    assert_eq!(series.len(), 3);
    assert_eq!(series.counts(), vec![120.0, 98.0, 105.0]);
    assert_eq!(series.dates(), vec![day(1), day(2), day(4)]);

    let first = &series.observations()[0].exogenous;
    assert_eq!(first["promo"], ExogValue::Flag(true));
    assert_eq!(first["temp"], ExogValue::Numeric(21.5));
    assert_eq!(first["weather"], ExogValue::Category("sun".into()));
    assert_eq!(series.observations()[2].exogenous["temp"], ExogValue::Numeric(19.0));

    let by_date = series.exog_by_date();
    assert_eq!(by_date.len(), 2);
    assert!(!by_date.contains_key(&day(2)));
}

#[test]
fn test_unordered_json_is_rejected() {
    let text = r#"[
        {"date": "2024-06-02", "count": 1},
        {"date": "2024-06-01", "count": 2}
    ]"#;
    let err = serde_json::from_str::<VisitSeries>(text).unwrap_err();
    assert!(err.to_string().contains("chronological"));
}

#[test]
fn test_negative_counts_are_rejected() {
    let text = r#"[{"date": "2024-06-01", "count": -4}]"#;
    assert!(serde_json::from_str::<VisitSeries>(text).is_err());
}

#[test]
fn test_series_serializes_as_observation_list() {
    let series = VisitSeries::new(vec![
        Observation::new(day(1), 10),
        Observation::new(day(2), 12).with_exog("promo", ExogValue::Flag(false)),
    ])
    .unwrap();
    let json = serde_json::to_value(&series).unwrap();

    assert!(json.is_array());
    assert_eq!(json[0]["date"], "2024-06-01");
    assert!(json[0].get("exogenous").is_none());
    assert_eq!(json[1]["exogenous"]["promo"], false);

    let back: VisitSeries = serde_json::from_value(json).unwrap();
    assert_eq!(back, series);
}

#[test]
fn test_error_messages() {
    let err = ForecastError::insufficient(45, 38);
    assert_eq!(err.missing_days(), Some(7));
    assert_eq!(
        err.to_string(),
        "Insufficient data: need 7 more days of data (have 38, require 45)"
    );

    // `required` never drops to `available`
    let err = ForecastError::insufficient(10, 10);
    assert_eq!(err.missing_days(), Some(1));

    assert_eq!(ForecastError::InvalidHorizon(0).missing_days(), None);
    assert_eq!(
        ForecastError::InvalidHorizon(0).to_string(),
        "Invalid horizon 0: horizon must be at least 1"
    );
    assert_eq!(
        ForecastError::InsufficientFolds {
            required: 3,
            available: 2
        }
        .to_string(),
        "Insufficient folds: backtest produced 2 folds, at least 3 required"
    );
}
