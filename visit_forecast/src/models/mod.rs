//! Count models and the naive baselines they are judged against

pub mod baselines;
pub mod count_model;

pub use baselines::{Baseline, MovingAverageBaseline, NaiveBaseline, SeasonalNaiveBaseline};
pub use count_model::{filter, log_likelihood, ArchMemory, Filtered, ModelParameters};
