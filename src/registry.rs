//! Fitted models keyed by dataset identity
//!
//! The registry replaces a process-wide "latest model" slot: callers name the
//! dataset a model was trained on, replace or invalidate it explicitly, and
//! take a per-dataset lock around fits so two fits of the same data never
//! race. Each dataset keeps a bounded archive of superseded models, and
//! [`ModelRegistry::forget`] drops a dataset entirely.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use thiserror::Error;
use tracing::{debug, info};
use visit_forecast::{FittedModel, ForecastError};

/// Errors raised by the registry and the forecast service
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No model is registered for the dataset
    #[error("No model registered for dataset '{0}'; train one first")]
    NotFound(DatasetId),

    /// A thread panicked while holding a registry lock
    #[error("Registry lock poisoned: {0}")]
    Poisoned(String),

    /// Error from the forecasting engine
    #[error(transparent)]
    Forecast(#[from] ForecastError),
}

/// Result type for registry and service operations
pub type Result<T> = std::result::Result<T, RegistryError>;

fn poisoned<T>(err: std::sync::PoisonError<T>) -> RegistryError {
    RegistryError::Poisoned(err.to_string())
}

/// Identity of the data a model was fitted on (a store, a store and mode, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DatasetId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Superseded models kept per dataset by [`ModelRegistry::new`]
pub const DEFAULT_ARCHIVE_LIMIT: usize = 8;

/// A model as stored in the registry
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredModel {
    /// Per-dataset version, starting at 1 and bumped on every insert
    pub version: u64,
    pub model: Arc<FittedModel>,
}

#[derive(Debug, Default)]
struct Slot {
    current: Option<RegisteredModel>,
    archive: Vec<RegisteredModel>,
    next_version: u64,
}

impl Slot {
    /// Archive `entry`, dropping the oldest entries beyond `limit`
    fn retire(&mut self, entry: RegisteredModel, limit: usize) {
        self.archive.push(entry);
        let excess = self.archive.len().saturating_sub(limit);
        self.archive.drain(..excess);
    }
}

/// Handle on the per-dataset fit lock
#[derive(Debug, Clone)]
pub struct FitLock {
    dataset: DatasetId,
    lock: Arc<Mutex<()>>,
}

impl FitLock {
    /// Block until no other fit of this dataset is running
    pub fn acquire(&self) -> Result<MutexGuard<'_, ()>> {
        debug!(dataset = %self.dataset, "waiting for fit lock");
        self.lock.lock().map_err(poisoned)
    }

    /// Take the lock only if it is free
    pub fn try_acquire(&self) -> Option<MutexGuard<'_, ()>> {
        self.lock.try_lock().ok()
    }
}

/// Thread-safe store of fitted models
#[derive(Debug)]
pub struct ModelRegistry {
    slots: RwLock<HashMap<DatasetId, Slot>>,
    locks: Mutex<HashMap<DatasetId, Arc<Mutex<()>>>>,
    archive_limit: usize,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_archive_limit(DEFAULT_ARCHIVE_LIMIT)
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry keeping at most `limit` superseded models per dataset
    pub fn with_archive_limit(limit: usize) -> Self {
        Self {
            slots: RwLock::default(),
            locks: Mutex::default(),
            archive_limit: limit,
        }
    }

    /// Superseded models kept per dataset
    pub fn archive_limit(&self) -> usize {
        self.archive_limit
    }

    /// Register `model` as current for `dataset`; the model it replaces is archived
    pub fn insert(&self, dataset: &DatasetId, model: FittedModel) -> Result<RegisteredModel> {
        let mut slots = self.slots.write().map_err(poisoned)?;
        let slot = slots.entry(dataset.clone()).or_default();
        slot.next_version += 1;
        let entry = RegisteredModel {
            version: slot.next_version,
            model: Arc::new(model),
        };
        if let Some(previous) = slot.current.replace(entry.clone()) {
            slot.retire(previous, self.archive_limit);
        }
        info!(
            dataset = %dataset,
            version = entry.version,
            fallback = entry.model.is_fallback(),
            "model registered"
        );
        Ok(entry)
    }

    /// Current model for `dataset`
    pub fn get(&self, dataset: &DatasetId) -> Result<Option<RegisteredModel>> {
        let slots = self.slots.read().map_err(poisoned)?;
        Ok(slots.get(dataset).and_then(|slot| slot.current.clone()))
    }

    /// Current model for `dataset`, or `NotFound`
    pub fn require(&self, dataset: &DatasetId) -> Result<RegisteredModel> {
        self.get(dataset)?
            .ok_or_else(|| RegistryError::NotFound(dataset.clone()))
    }

    /// Drop the current model for `dataset` into the archive.
    ///
    /// Returns the invalidated model, if there was one.
    pub fn invalidate(&self, dataset: &DatasetId) -> Result<Option<RegisteredModel>> {
        let mut slots = self.slots.write().map_err(poisoned)?;
        let limit = self.archive_limit;
        let removed = slots.get_mut(dataset).and_then(|slot| {
            let current = slot.current.take()?;
            slot.retire(current.clone(), limit);
            Some(current)
        });
        if let Some(entry) = &removed {
            info!(dataset = %dataset, version = entry.version, "model invalidated");
        }
        Ok(removed)
    }

    /// Drop everything held for `dataset`: current model, archive, version
    /// counter and fit lock. Versions restart at 1 afterwards.
    ///
    /// A fit lock still held through a [`FitLock`] stays registered so it
    /// keeps excluding new fits. Returns the current model, if there was one.
    pub fn forget(&self, dataset: &DatasetId) -> Result<Option<RegisteredModel>> {
        let (removed, archived) = {
            let mut slots = self.slots.write().map_err(poisoned)?;
            match slots.remove(dataset) {
                Some(slot) => (slot.current, slot.archive.len()),
                None => (None, 0),
            }
        };

        let mut locks = self.locks.lock().map_err(poisoned)?;
        let idle = locks
            .get(dataset)
            .map_or(false, |lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(dataset);
        }

        info!(
            dataset = %dataset,
            had_model = removed.is_some(),
            archived,
            lock_released = idle,
            "dataset forgotten"
        );
        Ok(removed)
    }

    /// Superseded and invalidated models for `dataset`, oldest first
    pub fn archive(&self, dataset: &DatasetId) -> Result<Vec<RegisteredModel>> {
        let slots = self.slots.read().map_err(poisoned)?;
        Ok(slots
            .get(dataset)
            .map(|slot| slot.archive.clone())
            .unwrap_or_default())
    }

    /// Number of datasets with a current model
    pub fn len(&self) -> Result<usize> {
        let slots = self.slots.read().map_err(poisoned)?;
        Ok(slots.values().filter(|s| s.current.is_some()).count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of datasets with a fit lock entry
    pub fn fit_locks(&self) -> Result<usize> {
        Ok(self.locks.lock().map_err(poisoned)?.len())
    }

    /// The lock serializing fits of `dataset`
    pub fn fit_lock(&self, dataset: &DatasetId) -> Result<FitLock> {
        let mut locks = self.locks.lock().map_err(poisoned)?;
        let lock = locks.entry(dataset.clone()).or_default().clone();
        Ok(FitLock {
            dataset: dataset.clone(),
            lock,
        })
    }
}
