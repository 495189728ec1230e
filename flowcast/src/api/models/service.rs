use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::LoadedModel;

/// Response for `GET /`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    pub service: String,
    pub status: String,
    pub model_loaded: bool,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Response for `GET /status`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub model_loaded: bool,
    /// Configured artifact path
    pub model_path: String,
    /// Whether the artifact currently exists on disk
    pub model_exists: bool,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    /// Details of the model currently serving, absent until one loads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelStatus>,
}

/// Details of the loaded model
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelStatus {
    pub loaded_at: DateTime<Utc>,
    pub num_trees: usize,
    pub objective: String,
}

impl From<&LoadedModel> for ModelStatus {
    fn from(model: &LoadedModel) -> Self {
        let summary = model.summary();
        Self {
            loaded_at: model.loaded_at,
            num_trees: summary.num_trees,
            objective: summary.objective,
        }
    }
}

/// Response for `POST /reload`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReloadResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
