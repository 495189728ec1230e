//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `FLOWCAST_CONFIG`
//! environment variable. A missing file is fine: every field has a default.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `FLOWCAST_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `FLOWCAST_MODEL__PATH=/srv/models/volume.json` sets the `model.path` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use flowcast::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Serving {} on {}", config.model.path.display(), config.bind_address());
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! FLOWCAST_PORT=8080
//!
//! # Serve only the bare /predict endpoint
//! FLOWCAST_MODE=minimal
//!
//! # Reload automatically when the artifact changes
//! FLOWCAST_MODEL__WATCH=true
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::Error;
use crate::validation::Strictness;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "FLOWCAST_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Which surface to serve: the full hardened API or the bare `/predict` endpoint
    pub mode: ServiceMode,
    /// Model artifact location and loading behaviour
    pub model: ModelConfig,
    /// Batch prediction limits
    pub batch: BatchConfig,
    /// Cross-origin settings. No CORS headers are sent when `allowed_origins` is empty.
    pub cors: CorsConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Service surface.
///
/// `hardened` serves every endpoint, validates ranges and returns structured error codes.
/// `minimal` serves only `/predict`, checks presence and integer-ness only, and returns bare
/// `{node, time, volume}` / `{error}` bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    Minimal,
    #[default]
    Hardened,
}

impl ServiceMode {
    pub fn strictness(self) -> Strictness {
        match self {
            ServiceMode::Minimal => Strictness::Lenient,
            ServiceMode::Hardened => Strictness::Full,
        }
    }

    pub fn is_hardened(self) -> bool {
        self == ServiceMode::Hardened
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Path of the XGBoost JSON model artifact
    pub path: PathBuf,
    /// Load the model before accepting requests (otherwise it loads on first prediction)
    pub load_on_startup: bool,
    /// Reload the model when the artifact changes on disk
    pub watch: bool,
    /// Quiet period after the last file event before reloading
    #[serde(with = "humantime_serde")]
    pub watch_debounce: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/node_volume_model.json"),
            load_on_startup: true,
            watch: false,
            watch_debounce: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Maximum number of node ids accepted in one batch request
    pub max_nodes: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_nodes: 10_000 }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight responses for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            mode: ServiceMode::default(),
            model: ModelConfig::default(),
            batch: BatchConfig::default(),
            cors: CorsConfig::default(),
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.model.path.as_os_str().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: model.path cannot be empty".to_string(),
            });
        }

        if self.model.watch && self.model.path.file_name().is_none() {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: model.watch requires model.path to name a file, got '{}'",
                    self.model.path.display()
                ),
            });
        }

        if self.model.watch && self.model.watch_debounce.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: model.watch_debounce must be positive when model.watch is enabled".to_string(),
            });
        }

        if self.batch.max_nodes == 0 {
            return Err(Error::Internal {
                operation: "Config validation: batch.max_nodes cannot be 0".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values. FLOWCAST_CONFIG names
            // the file itself and is not a config key.
            .merge(Env::prefixed("FLOWCAST_").ignore(&["config"]).split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
