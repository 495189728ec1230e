//! Traffic volume model: loading, holding and evaluating the regressor.
//!
//! The service predicts traffic volume from a two-column feature row `[node, time]`.
//! The model itself is an XGBoost `gbtree` booster saved in XGBoost's JSON format;
//! [`xgboost`] parses and evaluates it. Handlers never see the booster directly, they
//! go through the [`Regressor`] trait on a [`LoadedModel`] taken from the [`ModelStore`].
//!
//! - [`store`]: the swappable model slot with `load`/`ensure_loaded`/`reload`
//! - [`xgboost`]: XGBoost JSON model format and tree evaluation

pub mod store;
pub mod xgboost;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

pub use store::ModelStore;

/// Column order the model was trained with.
pub const FEATURE_COLUMNS: [&str; 2] = ["node", "time"];

/// Predicted volumes are never reported below this value.
pub const MIN_VOLUME: f64 = 1.0;

/// A single row of model input, in [`FEATURE_COLUMNS`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureRow {
    pub node: i64,
    pub time: i64,
}

impl FeatureRow {
    pub fn new(node: i64, time: i64) -> Self {
        Self { node, time }
    }

    /// Feature values as the booster sees them (XGBoost evaluates in `f32`).
    pub fn values(&self) -> [f32; 2] {
        [self.node as f32, self.time as f32]
    }
}

/// Anything that can turn a feature row into a raw volume prediction.
pub trait Regressor: Send + Sync + std::fmt::Debug {
    /// Evaluate the model on one row, returning the untransformed-by-us output.
    fn predict(&self, row: &FeatureRow) -> Result<f64, InferenceError>;

    /// Short description of the model for status reporting.
    fn summary(&self) -> ModelSummary;
}

/// Facts about a loaded model, reported by `/status`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModelSummary {
    /// Number of trees in the ensemble
    pub num_trees: usize,
    /// Training objective, e.g. `reg:squarederror`
    pub objective: String,
}

/// A model handle together with where and when it was loaded.
#[derive(Debug)]
pub struct LoadedModel {
    pub path: PathBuf,
    pub loaded_at: DateTime<Utc>,
    regressor: Box<dyn Regressor>,
}

impl LoadedModel {
    pub fn new(path: PathBuf, regressor: Box<dyn Regressor>) -> Self {
        Self {
            path,
            loaded_at: Utc::now(),
            regressor,
        }
    }

    /// Predict the volume for one row and floor it at [`MIN_VOLUME`].
    ///
    /// A non-finite model output is an inference failure, not a volume.
    pub fn predict_volume(&self, row: &FeatureRow) -> Result<f64, InferenceError> {
        let raw = self.regressor.predict(row)?;
        if !raw.is_finite() {
            return Err(InferenceError::NonFinite { value: raw });
        }
        Ok(raw.max(MIN_VOLUME))
    }

    pub fn summary(&self) -> ModelSummary {
        self.regressor.summary()
    }
}

/// Why a model artifact could not be turned into a [`LoadedModel`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("model file does not exist: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read model file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to deserialize model: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid model: {0}")]
    Invalid(String),
}

/// Failure while evaluating a loaded model.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("tree {tree} references node {node} outside of its {len} nodes")]
    NodeOutOfRange { tree: usize, node: i64, len: usize },

    #[error("tree {tree} did not reach a leaf within {steps} steps")]
    Cycle { tree: usize, steps: usize },

    #[error("model produced a non-finite prediction ({value})")]
    NonFinite { value: f64 },
}
