//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - entiql.toml (default configuration)
//! - entiql.local.toml (git-ignored local overrides)
//! - Environment variables (EQL_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # entiql.toml
//! [evaluation]
//! max_results = 100000
//! timeout_ms = 30000
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! EQL_EVALUATION__MAX_RESULTS=1000
//! EQL_LOGGING__LEVEL=trace
//! ```

use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::execution::{ExecutionConfig, ResourceLimits};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Evaluation limits and timeout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Maximum number of results per evaluation (absent = unlimited)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,

    /// Maximum number of intermediate bindings per evaluation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_intermediate: Option<usize>,

    /// Maximum product nesting depth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,

    /// Evaluation timeout in milliseconds (absent = no timeout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. entiql.toml (base configuration)
    /// 2. entiql.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (EQL_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("entiql.toml"))
            .merge(Toml::file("entiql.local.toml"))
            .merge(Env::prefixed("EQL_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("EQL_").split("__"))
            .extract()
    }

    /// Execution settings derived from this configuration
    pub fn execution(&self) -> ExecutionConfig {
        ExecutionConfig {
            timeout: self.evaluation.timeout_ms.map(Duration::from_millis),
            limits: ResourceLimits {
                max_results: self.evaluation.max_results,
                max_intermediate: self.evaluation.max_intermediate,
                max_depth: self.evaluation.max_depth,
            },
        }
    }
}

impl LoggingConfig {
    /// Install a global tracing subscriber honouring this level (and
    /// `RUST_LOG` when set). Ignored if a subscriber is already set.
    pub fn init(&self) {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.clone()));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init();
    }
}
