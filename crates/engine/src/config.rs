//! File and environment configuration
//!
//! A [`DatabaseConfig`] can be loaded from TOML and then overridden from the
//! environment. Precedence is `builder calls > env > file > defaults`.
//!
//! ```toml
//! path = "/var/lib/app/data.slowdb"
//! read_only = false
//! no_sync = false
//!
//! [slow]
//! threshold = "2s"          # "disabled", "default", "250ms", "1m", ...
//! resolve_function_names = false  # file and line only
//! ```
//!
//! All faults here surface as [`Error::Config`] at load time, never per call.

use serde::{Deserialize, Serialize};
use slowdb_core::{Error, Result, SlowThreshold};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding `slow.threshold`
pub const SLOW_THRESHOLD_ENV: &str = "SLOWDB_SLOW_THRESHOLD";

/// Slow-call detection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlowConfig {
    /// When a call counts as slow
    pub threshold: SlowThreshold,
    /// Name the enclosing function in diagnostics
    ///
    /// On by default. Turning it off skips the per-call stack capture and
    /// reports file and line only.
    pub resolve_function_names: bool,
}

impl Default for SlowConfig {
    fn default() -> Self {
        Self {
            threshold: SlowThreshold::Default,
            resolve_function_names: true,
        }
    }
}

/// Everything a database can be opened from, minus code-only hooks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Snapshot file; `None` keeps data in memory
    pub path: Option<PathBuf>,
    /// Reject write transactions
    pub read_only: bool,
    /// Skip persisting on every commit; persist on close instead
    pub no_sync: bool,
    /// Slow-call detection
    pub slow: SlowConfig,
}

impl DatabaseConfig {
    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&source)?;
        debug!(path = %path.display(), threshold = %config.slow.threshold, "config loaded");
        Ok(config)
    }

    /// Defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env_overrides()
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(&process_overrides())
    }

    /// Apply overrides from an explicit variable map
    pub fn with_overrides_from(mut self, env: &HashMap<String, String>) -> Result<Self> {
        if let Some(value) = env.get(SLOW_THRESHOLD_ENV) {
            self.slow.threshold = value.parse().map_err(|e| {
                Error::Config(format!("{}={:?}: {}", SLOW_THRESHOLD_ENV, value, e))
            })?;
            debug!(threshold = %self.slow.threshold, "slow threshold overridden from env");
        }
        Ok(self)
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// The override variables currently set in the process environment
pub(crate) fn process_overrides() -> HashMap<String, String> {
    let mut env = HashMap::new();
    if let Ok(value) = std::env::var(SLOW_THRESHOLD_ENV) {
        env.insert(SLOW_THRESHOLD_ENV.to_string(), value);
    }
    env
}
