//! API request and response data models.
//!
//! Request bodies are deliberately loose: `node`, `time`, `nodeIds` and `timePoint` arrive as
//! raw JSON values and are coerced in [`crate::validation`], so `"12"` and `12` are both
//! accepted. The schemas advertise the integer form.
//!
//! - [`predict`]: single and batch prediction payloads
//! - [`service`]: service info, status and reload payloads

pub mod predict;
pub mod service;

use std::time::Duration;

/// Milliseconds rounded to two decimals, as reported in `processing_time_ms`.
pub fn round_millis(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}
