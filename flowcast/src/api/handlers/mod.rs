//! HTTP request handlers.
//!
//! - [`predict`]: single and batch volume predictions
//! - [`service`]: service info, status, model reload and the not-found fallback
//!
//! Handlers return [`crate::errors::Error`] for failures; in minimal mode they render the
//! plain `{"error": ...}` body instead of the structured one.

pub mod predict;
pub mod service;

use axum::body::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{Error, Result};

/// Parse a request body that must be a JSON object into `T`.
///
/// Content type is not enforced; an empty body, invalid JSON or any non-object value is a
/// client error.
pub(crate) fn parse_object_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    let invalid = || Error::Validation {
        message: "request body must be a JSON object".to_string(),
    };
    match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => serde_json::from_value(value).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}
