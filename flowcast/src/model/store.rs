//! The swappable model slot shared by all handlers.
//!
//! Predictions take a lock-free snapshot of the current [`LoadedModel`]; loads and reloads build
//! a complete new model and swap it in atomically. A failed load leaves the slot untouched, so
//! the previous model keeps serving. Loads are serialized so two reload requests cannot race.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, instrument, warn};

use super::xgboost::XgbRegressor;
use super::{LoadError, LoadedModel};
use crate::metrics;

#[derive(Debug)]
pub struct ModelStore {
    path: PathBuf,
    current: ArcSwapOption<LoadedModel>,
    load_lock: Mutex<()>,
}

impl ModelStore {
    /// Create an empty store for the artifact at `path`. Nothing is read until a load.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: ArcSwapOption::empty(),
            load_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the model currently serving, if any.
    pub fn current(&self) -> Option<Arc<LoadedModel>> {
        self.current.load_full()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }

    /// Whether the artifact exists on disk. Does not load anything.
    pub async fn artifact_exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Read the artifact and swap it in. On failure the previous model (if any) stays in place.
    pub async fn load(&self) -> Result<Arc<LoadedModel>, LoadError> {
        let guard = self.load_lock.lock().await;
        self.load_locked(&guard).await
    }

    /// Return the current model, loading it once if the slot is empty.
    pub async fn ensure_loaded(&self) -> Option<Arc<LoadedModel>> {
        if let Some(model) = self.current() {
            return Some(model);
        }

        let guard = self.load_lock.lock().await;
        // Another request may have finished loading while we waited
        if let Some(model) = self.current() {
            return Some(model);
        }
        warn!("Model not loaded, attempting to load {}", self.path.display());
        self.load_locked(&guard).await.ok()
    }

    /// Unconditionally re-read the artifact, e.g. after it was replaced on disk.
    pub async fn reload(&self) -> Result<Arc<LoadedModel>, LoadError> {
        info!("Reloading model from {}", self.path.display());
        self.load().await
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn load_locked(&self, _guard: &MutexGuard<'_, ()>) -> Result<Arc<LoadedModel>, LoadError> {
        match self.read_artifact().await {
            Ok(model) => {
                let model = Arc::new(model);
                self.current.store(Some(model.clone()));
                let summary = model.summary();
                info!(
                    num_trees = summary.num_trees,
                    objective = %summary.objective,
                    "Model loaded from {}",
                    self.path.display()
                );
                metrics::record_model_load(true);
                Ok(model)
            }
            Err(e) => {
                match &e {
                    LoadError::NotFound { .. } => error!("Model file does not exist: {}", self.path.display()),
                    _ => error!("Failed to load model: {}", e),
                }
                if self.is_loaded() {
                    warn!("Keeping previously loaded model");
                }
                metrics::record_model_load(false);
                Err(e)
            }
        }
    }

    async fn read_artifact(&self) -> Result<LoadedModel, LoadError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LoadError::NotFound { path: self.path.clone() });
            }
            Err(source) => {
                return Err(LoadError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let regressor = tokio::task::spawn_blocking(move || XgbRegressor::from_slice(&bytes))
            .await
            .map_err(|e| LoadError::Invalid(format!("model parsing task failed: {e}")))??;

        Ok(LoadedModel::new(self.path.clone(), Box::new(regressor)))
    }
}
