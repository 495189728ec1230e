//! HTTP surface of the prediction service.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - `GET|POST /predict`: single prediction for a node and hour of day
//! - `POST /predict/batch`: predictions for many nodes at one hour (hardened mode)
//! - `GET /`, `GET /status`: service and model state (hardened mode)
//! - `POST /reload`: re-read the model artifact from disk (hardened mode)
//!
//! In hardened mode the OpenAPI document is served at `/api-docs/openapi.json`, with an
//! interactive viewer at `/docs`.

pub mod handlers;
pub mod models;
