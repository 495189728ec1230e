//! # flowcast: Traffic Volume Prediction Service
//!
//! `flowcast` serves a pre-trained gradient-boosted tree model over HTTP. Given a road network
//! node id and an hour of day it predicts the traffic volume at that node, either one pair at a
//! time or for many nodes at once.
//!
//! ## Overview
//!
//! The model is trained offline and saved as an XGBoost JSON artifact. At startup (or on the
//! first prediction) the service parses and validates the artifact, then keeps it in memory for
//! every request. The artifact can be replaced on disk and reloaded without a restart, either by
//! calling `POST /reload` or automatically when `model.watch` is enabled. A reload that fails
//! leaves the previous model serving.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum). State is small: the
//! configuration, a [`model::ModelStore`] holding the current model behind an atomic pointer,
//! and the process start time.
//!
//! ### Request Flow
//!
//! A prediction request first makes sure a model is available (loading it if needed), then
//! coerces and validates `node` and `time` in [`validation`], evaluates the booster and floors
//! the result at 1.0. Failures are [`errors::Error`] values that render as structured JSON.
//!
//! ### Service Modes
//!
//! `mode: hardened` (the default) serves the full API: single and batch predictions, service
//! info, status, reload and OpenAPI docs, with range validation and structured error codes.
//! `mode: minimal` serves only `/predict`, checks that values are present integers, and answers
//! with bare bodies.
//!
//! ### Core Components
//!
//! - [`api`]: handlers and request/response models
//! - [`model`]: XGBoost JSON parsing, tree evaluation and the swappable model slot
//! - [`validation`]: parameter coercion and range checks
//! - [`watcher`]: file watching for automatic reloads
//! - [`config`], [`telemetry`], [`metrics`]: ambient configuration, logging and metrics
//!
//! ## Configuration
//!
//! See [`config`] for the YAML file and `FLOWCAST_` environment overrides.
//!
//! ```bash
//! flowcast -f config.yaml
//! flowcast --validate
//! ```

pub mod api;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod openapi;
pub mod telemetry;
pub mod validation;
pub mod watcher;

#[cfg(test)]
pub mod test_utils;

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    http::{self, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use config::CorsOrigin;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{api::handlers, errors::Error, model::ModelStore, openapi::ApiDoc};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .models(Arc::new(ModelStore::new(&config.model.path)))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub models: Arc<ModelStore>,
    #[builder(default = Instant::now())]
    pub started_at: Instant,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let origins = &config.cors.allowed_origins;
    let allow_origin = if origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut values = Vec::with_capacity(origins.len());
        for origin in origins {
            if let CorsOrigin::Url(url) = origin {
                // Origins never carry a trailing slash
                values.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(values)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([http::header::CONTENT_TYPE]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Render a handler panic as a structured 500 instead of dropping the connection.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    Error::Internal {
        operation: format!("handle request (handler panicked: {detail})"),
    }
    .into_response()
}

/// Build the application router with all endpoints and middleware.
///
/// The route table depends on [`config::ServiceMode`]: minimal mode only serves `/predict`.
/// Unmatched paths go to the not-found handler in either mode.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let hardened = state.config.mode.is_hardened();

    let mut routes = Router::new().route(
        "/predict",
        get(handlers::predict::predict_get).post(handlers::predict::predict_post),
    );
    if hardened {
        routes = routes
            .route("/", get(handlers::service::home))
            .route("/predict/batch", post(handlers::predict::predict_batch))
            .route("/status", get(handlers::service::status))
            .route("/reload", post(handlers::service::reload));
    }

    let mut router = routes.fallback(handlers::service::not_found).with_state(state.clone());

    if hardened {
        router = router
            .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
            .merge(Scalar::with_url("/docs", ApiDoc::openapi()));
    }

    if !state.config.cors.allowed_origins.is_empty() {
        router = router.layer(create_cors_layer(&state.config)?);
    }

    // Add Prometheus metrics if enabled
    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(CatchPanicLayer::custom(handle_panic)).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Background tasks running alongside the HTTP server (currently the model file watcher).
///
/// Dropping this cancels the shutdown token through `drop_guard`, stopping every task.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

fn setup_background_services(
    config: &Config,
    models: Arc<ModelStore>,
    shutdown_token: CancellationToken,
) -> anyhow::Result<BackgroundServices> {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();

    if config.model.watch {
        let handle = watcher::spawn_model_watcher(models, config.model.watch_debounce, shutdown_token.clone())?;
        background_tasks.push(handle);
    } else {
        debug!("Model file watching disabled");
    }

    Ok(BackgroundServices {
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    })
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] loads the model (unless deferred) and starts background
///    services
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests
/// 3. **Shutdown**: on the shutdown signal, stops background services and flushes telemetry
pub struct Application {
    router: Router,
    config: Config,
    bg_services: BackgroundServices,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting flowcast with configuration: {:#?}", config);

        let models = Arc::new(ModelStore::new(config.model.path.clone()));
        if config.model.load_on_startup {
            if let Err(e) = models.load().await {
                warn!("Starting without a model ({}); predictions return 503 until it loads", e);
            }
        } else {
            info!("Deferring model load until the first prediction");
        }

        let shutdown_token = CancellationToken::new();
        let bg_services = setup_background_services(&config, models.clone(), shutdown_token)?;

        let app_state = AppState::builder().config(config.clone()).models(models).build();
        let router = build_router(&app_state)?;

        Ok(Self {
            router,
            config,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "flowcast ({:?} mode) listening on http://{}, available at http://localhost:{}",
            self.config.mode, bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        self.bg_services.shutdown().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
