//! Engine configuration.
//!
//! # Responsibility
//! - Hold the tunable limits of the patch engine and its read APIs.
//! - Load settings from a TOML document, falling back to defaults for any
//!   omitted field.
//!
//! # Invariants
//! - Every numeric limit is strictly positive after [`EngineConfig::validate`].
//! - A missing config file is not an error; it yields defaults.

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors from loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file exists but cannot be read.
    Io { path: PathBuf, source: std::io::Error },
    /// Config text is not valid TOML for [`EngineConfig`].
    Parse(String),
    /// A field holds an unusable value.
    Invalid { field: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(message) => write!(f, "failed to parse config: {message}"),
            Self::Invalid { field, message } => write!(f, "invalid config `{field}`: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(_) => None,
            Self::Invalid { .. } => None,
        }
    }
}

/// Logging section of the engine config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory for rolling log files. `None` disables file logging.
    pub dir: Option<PathBuf>,
    /// Size at which the active log file is rotated.
    pub max_file_size_mb: u64,
    /// Rotated files kept on disk.
    pub keep_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            dir: None,
            max_file_size_mb: 10,
            keep_files: 5,
        }
    }
}

/// Tunable limits for the patch engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on `ops.len()` for one patch request.
    pub max_ops_per_patch: usize,
    /// Retention window for idempotency records, in seconds.
    pub idempotency_ttl_secs: u64,
    /// Longest client-supplied idempotency key accepted, in characters.
    pub max_idempotency_key_len: usize,
    /// Bound on the ancestor walk performed by the cycle detector.
    pub max_tree_depth: usize,
    /// Search hit count when the caller passes no limit.
    pub search_default_limit: u32,
    /// Hard ceiling for search hit count.
    pub search_max_limit: u32,
    /// SQLite busy timeout applied to connections opened by this crate.
    pub busy_timeout_ms: u64,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_ops_per_patch: 1000,
            idempotency_ttl_secs: 24 * 60 * 60,
            max_idempotency_key_len: 255,
            max_tree_depth: 4096,
            search_default_limit: 20,
            search_max_limit: 100,
            busy_timeout_ms: 5000,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects zero limits and inverted search bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_ops_per_patch", self.max_ops_per_patch as u64),
            ("idempotency_ttl_secs", self.idempotency_ttl_secs),
            ("max_idempotency_key_len", self.max_idempotency_key_len as u64),
            ("max_tree_depth", self.max_tree_depth as u64),
            ("search_default_limit", u64::from(self.search_default_limit)),
            ("search_max_limit", u64::from(self.search_max_limit)),
            ("logging.max_file_size_mb", self.logging.max_file_size_mb),
            ("logging.keep_files", self.logging.keep_files as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: "must be greater than zero".to_string(),
                });
            }
        }

        if self.search_default_limit > self.search_max_limit {
            return Err(ConfigError::Invalid {
                field: "search_default_limit",
                message: format!(
                    "{} exceeds search_max_limit {}",
                    self.search_default_limit, self.search_max_limit
                ),
            });
        }

        if let Some(dir) = &self.logging.dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid {
                    field: "logging.dir",
                    message: format!("must be absolute, got `{}`", dir.display()),
                });
            }
        }

        Ok(())
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }

    /// Clamps a caller-requested search limit into configured bounds.
    pub fn effective_search_limit(&self, requested: Option<u32>) -> u32 {
        match requested {
            None | Some(0) => self.search_default_limit,
            Some(value) => value.min(self.search_max_limit),
        }
    }
}

/// Loads config from `path`; a missing file yields defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    EngineConfig::from_toml_str(&text)
}
