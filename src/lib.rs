//! # StorePulse
//!
//! Caller-side facade over the `visit_forecast` engine.
//!
//! The engine itself keeps no state between calls. This crate owns the
//! pieces an application needs around it: a registry of fitted models keyed
//! by dataset, per-dataset serialization of fits, a one-call
//! train/forecast/backtest service, and tracing setup.
//!
//! ## Example
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use store_pulse::{DatasetId, ForecastService};
//! use visit_forecast::{EngineConfig, VisitSeries};
//!
//! # fn main() -> Result<(), store_pulse::RegistryError> {
//! store_pulse::telemetry::init_tracing("info").ok();
//!
//! let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let counts: Vec<u64> = (0..90).map(|d| 110 + (d % 7) * 6).collect();
//! let series = VisitSeries::from_counts(start, &counts)?;
//!
//! let service = ForecastService::new(EngineConfig::default())?;
//! let store = DatasetId::new("store-17");
//! service.train(&store, &series)?;
//! let week = service.forecast(&store, 7, None)?;
//! assert_eq!(week.len(), 7);
//! # Ok(())
//! # }
//! ```

pub mod registry;
pub mod service;
pub mod telemetry;

pub use registry::{
    DatasetId, FitLock, ModelRegistry, RegisteredModel, RegistryError, DEFAULT_ARCHIVE_LIMIT,
};
pub use service::ForecastService;

/// Version of the workspace facade
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
