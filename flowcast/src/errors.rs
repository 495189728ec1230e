use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

use crate::model::InferenceError;
use crate::validation::ValidationError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Malformed or out-of-range request input
    #[error("{message}")]
    Validation { message: String },

    /// No model could be loaded from the configured artifact
    #[error("Model is not loaded")]
    ModelUnavailable,

    /// The model failed while evaluating a request
    #[error("Prediction failed: {0}")]
    Inference(#[from] InferenceError),

    /// No route matched the request
    #[error("No endpoint at {path}")]
    NotFound {
        path: String,
        available: &'static [&'static str],
    },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Inference(_) | Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code included in hardened-mode responses
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "INVALID_PARAMETERS",
            Error::ModelUnavailable => "MODEL_NOT_LOADED",
            Error::Inference(_) => "PREDICTION_ERROR",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation { message } => message.clone(),
            Error::ModelUnavailable => "Model service unavailable".to_string(),
            Error::Inference(_) => "An error occurred during prediction".to_string(),
            Error::NotFound { .. } => "API endpoint not found".to_string(),
            Error::Internal { .. } => "Internal server error".to_string(),
        }
    }

    /// Render the minimal-mode body: just `{"error": ...}`, no codes.
    pub fn into_plain_response(self) -> Response {
        self.log();
        let status = self.status_code();
        (status, Json(json!({ "error": self.user_message() }))).into_response()
    }

    // Log full error details for debugging - different log levels based on severity
    fn log(&self) {
        match self {
            Error::Inference(_) | Error::Internal { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::ModelUnavailable => {
                tracing::warn!("Rejecting request: {}", self);
            }
            Error::Validation { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let mut body = json!({
            "error": self.user_message(),
            "code": self.code(),
            "success": false,
        });
        if let Error::NotFound { available, .. } = &self {
            body["available_endpoints"] = json!(available);
        }

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation { message: err.to_string() }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_structured_body_has_code() {
        let response = Error::ModelUnavailable.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = body_json(response).await;
        assert_eq!(body["code"], "MODEL_NOT_LOADED");
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_inference_details_are_not_leaked() {
        let err = Error::from(InferenceError::NonFinite { value: f64::INFINITY });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["code"], "PREDICTION_ERROR");
        assert!(!body["error"].as_str().unwrap().contains("non-finite"));
    }

    #[tokio::test]
    async fn test_validation_error_keeps_message() {
        let response = Error::from(ValidationError::NodeNotPositive).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "node must be greater than 0");
    }

    #[tokio::test]
    async fn test_internal_error_hides_operation() {
        let err = Error::Internal {
            operation: "read secrets".to_string(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_not_found_lists_endpoints() {
        let err = Error::NotFound {
            path: "/foo".to_string(),
            available: &["/", "/predict"],
        };
        let body = body_json(err.into_response()).await;
        assert_eq!(body["available_endpoints"], json!(["/", "/predict"]));
    }

    #[tokio::test]
    async fn test_plain_response_has_no_code() {
        let response = Error::from(ValidationError::Missing).into_plain_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body, json!({ "error": "node and time parameters are required" }));
    }
}
