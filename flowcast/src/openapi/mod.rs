//! OpenAPI documentation for the prediction API.
//!
//! Served in hardened mode as JSON at `/api-docs/openapi.json` and rendered with Scalar at
//! `/docs`.

use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::api;

/// Structured error body returned by every hardened-mode failure.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[schema(example = json!({
    "error": "time must be between 0 and 23",
    "code": "INVALID_PARAMETERS",
    "success": false
}))]
pub struct ErrorBody {
    /// Human readable message, safe to show to callers
    pub error: String,
    /// One of `INVALID_PARAMETERS`, `MODEL_NOT_LOADED`, `PREDICTION_ERROR`, `NOT_FOUND`, `INTERNAL_ERROR`
    pub code: String,
    /// Always `false`
    pub success: bool,
    /// Routes served by this instance, only present on `NOT_FOUND`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_endpoints: Option<Vec<String>>,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Traffic Flow Prediction Model Server",
        description = "Predicts traffic volume at road network nodes by hour of day."
    ),
    paths(
        api::handlers::predict::predict_get,
        api::handlers::predict::predict_post,
        api::handlers::predict::predict_batch,
        api::handlers::service::home,
        api::handlers::service::status,
        api::handlers::service::reload,
    ),
    components(
        schemas(
            api::models::predict::PredictionRequest,
            api::models::predict::PredictionResponse,
            api::models::predict::BatchPredictionRequest,
            api::models::predict::BatchPredictionResponse,
            api::models::service::ServiceInfo,
            api::models::service::StatusResponse,
            api::models::service::ModelStatus,
            api::models::service::ReloadResponse,
            ErrorBody,
        )
    ),
    tags(
        (name = "predictions", description = "Traffic volume predictions"),
        (name = "service", description = "Service info, status and model lifecycle"),
    )
)]
pub struct ApiDoc;
