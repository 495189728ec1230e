use axum::{
    Json,
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{info, instrument};

use crate::{
    AppState,
    api::models::service::{ModelStatus, ReloadResponse, ServiceInfo, StatusResponse},
    config::ServiceMode,
    errors::Error,
};

pub const SERVICE_NAME: &str = "Traffic Flow Prediction Model Server";

/// Routes served in each mode, as listed in not-found responses.
pub fn available_endpoints(mode: ServiceMode) -> &'static [&'static str] {
    match mode {
        ServiceMode::Hardened => &["/", "/predict", "/predict/batch", "/status", "/reload"],
        ServiceMode::Minimal => &["/predict"],
    }
}

#[utoipa::path(
    get,
    path = "/",
    tag = "service",
    summary = "Service info",
    responses(
        (status = 200, description = "Service name, version and whether a model is loaded", body = ServiceInfo)
    )
)]
pub async fn home(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: SERVICE_NAME.to_string(),
        status: "running".to_string(),
        model_loaded: state.models.is_loaded(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/status",
    tag = "service",
    summary = "Service status",
    description = "Report model state without loading anything.",
    responses(
        (status = 200, description = "Model and process status", body = StatusResponse)
    )
)]
#[instrument(skip_all)]
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let current = state.models.current();
    Json(StatusResponse {
        status: "healthy".to_string(),
        model_loaded: current.is_some(),
        model_path: state.models.path().display().to_string(),
        model_exists: state.models.artifact_exists().await,
        timestamp: Utc::now(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        model: current.as_deref().map(ModelStatus::from),
    })
}

#[utoipa::path(
    post,
    path = "/reload",
    tag = "service",
    summary = "Reload model",
    description = "Re-read the model artifact. On failure the previously loaded model keeps serving.",
    responses(
        (status = 200, description = "Model reloaded", body = ReloadResponse),
        (status = 500, description = "Reload failed", body = ReloadResponse)
    )
)]
#[instrument(skip_all)]
pub async fn reload(State(state): State<AppState>) -> (StatusCode, Json<ReloadResponse>) {
    info!("Received model reload request");
    let (status, success, message) = match state.models.reload().await {
        Ok(_) => (StatusCode::OK, true, "Model reloaded successfully"),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, false, "Model reload failed"),
    };
    (
        status,
        Json(ReloadResponse {
            success,
            message: message.to_string(),
            timestamp: Utc::now(),
        }),
    )
}

/// Fallback for unmatched routes.
pub async fn not_found(State(state): State<AppState>, uri: Uri) -> Response {
    let mode = state.config.mode;
    let err = Error::NotFound {
        path: uri.path().to_string(),
        available: available_endpoints(mode),
    };
    match mode {
        ServiceMode::Hardened => err.into_response(),
        ServiceMode::Minimal => err.into_plain_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::predict::PredictionResponse;
    use crate::test_utils::*;
    use serde_json::{Value, json};

    #[test_log::test(tokio::test)]
    async fn test_home_reports_service() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _bg_services) = create_test_app(create_test_config(&write_model(dir.path(), &sample_model_json()))).await;

        let response = app.get("/").await;
        response.assert_status_ok();
        let info: ServiceInfo = response.json();
        assert_eq!(info.service, SERVICE_NAME);
        assert_eq!(info.status, "running");
        assert!(info.model_loaded);
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    }

    #[test_log::test(tokio::test)]
    async fn test_status_with_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(dir.path(), &sample_model_json());
        let (app, _bg_services) = create_test_app(create_test_config(&path)).await;

        let status: StatusResponse = app.get("/status").await.json();
        assert_eq!(status.status, "healthy");
        assert!(status.model_loaded);
        assert!(status.model_exists);
        assert_eq!(status.model_path, path.display().to_string());

        let model = status.model.expect("model details should be reported");
        assert_eq!(model.num_trees, 2);
        assert_eq!(model.objective, "reg:squarederror");
    }

    #[test_log::test(tokio::test)]
    async fn test_status_does_not_load_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MODEL_FILE);
        let mut config = create_test_config(&path);
        config.model.load_on_startup = false;
        write_model(dir.path(), &sample_model_json());
        let (app, _bg_services) = create_test_app(config).await;

        let body: Value = app.get("/status").await.json();
        assert_eq!(body["model_loaded"], false);
        assert_eq!(body["model_exists"], true);
        assert!(body.get("model").is_none());

        // Still unloaded: status is a read-only probe
        assert_eq!(app.get("/").await.json::<Value>()["model_loaded"], false);
    }

    #[test_log::test(tokio::test)]
    async fn test_reload_replaces_model() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _bg_services) = create_test_app(create_test_config(&write_model(dir.path(), &constant_model_json(10.0)))).await;
        assert_eq!(app.get("/predict?node=1&time=1").await.json::<PredictionResponse>().volume, 10.0);

        write_model(dir.path(), &constant_model_json(55.0));
        let response = app.post("/reload").await;
        response.assert_status_ok();
        let reload: ReloadResponse = response.json();
        assert!(reload.success);
        assert_eq!(reload.message, "Model reloaded successfully");

        assert_eq!(app.get("/predict?node=1&time=1").await.json::<PredictionResponse>().volume, 55.0);
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_reload_keeps_serving() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(dir.path(), &constant_model_json(10.0));
        let (app, _bg_services) = create_test_app(create_test_config(&path)).await;

        std::fs::write(&path, b"{\"learner\": 1}").unwrap();
        let response = app.post("/reload").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let reload: ReloadResponse = response.json();
        assert!(!reload.success);
        assert_eq!(reload.message, "Model reload failed");

        assert_eq!(app.get("/predict?node=1&time=1").await.json::<PredictionResponse>().volume, 10.0);
        assert_eq!(app.get("/status").await.json::<Value>()["model_loaded"], true);
    }

    #[test_log::test(tokio::test)]
    async fn test_unknown_route_lists_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _bg_services) = create_test_app(create_test_config(&dir.path().join(MODEL_FILE))).await;

        let response = app.get("/nope").await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["error"], "API endpoint not found");
        assert_eq!(
            body["available_endpoints"],
            json!(["/", "/predict", "/predict/batch", "/status", "/reload"])
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_minimal_mode_serves_only_predict() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config(&write_model(dir.path(), &sample_model_json()));
        config.mode = ServiceMode::Minimal;
        let (app, _bg_services) = create_test_app(config).await;

        for uri in ["/", "/status", "/predict/batch", "/docs"] {
            let response = app.get(uri).await;
            response.assert_status(StatusCode::NOT_FOUND);
            assert_eq!(response.json::<Value>(), json!({ "error": "API endpoint not found" }));
        }
        app.post("/reload").await.assert_status(StatusCode::NOT_FOUND);
    }
}
