//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - tablemux.toml (default configuration)
//! - tablemux.local.toml (git-ignored local overrides)
//! - Environment variables (TABLEMUX_* prefix)
//!
//! Every key is optional; missing keys take their defaults.
//!
//! ## Example
//!
//! ```toml
//! # tablemux.toml
//! [dispatch]
//! mode = "per_table_worker"
//! record_error_policy = "abort_table"
//! worker_queue_depth = 16
//!
//! [session]
//! timeout_ms = 30000
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! TABLEMUX_DISPATCH__MODE=inline
//! TABLEMUX_SESSION__TIMEOUT_MS=0
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How handler callbacks are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Callbacks run on the session task, one event at a time.
    ///
    /// A panicking handler unwinds through the session; use
    /// `PerTableWorker` to confine a panic to its table.
    #[default]
    Inline,
    /// Each table gets its own task fed by a bounded queue
    PerTableWorker,
}

/// What happens to a table after `handle_record` fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordErrorPolicy {
    /// Record the failure and keep delivering; fatal handler errors still abort
    #[default]
    Continue,
    /// Stop delivering to the table on the first failure
    AbortTable,
}

/// What happens when the muxer declines a table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectPolicy {
    /// Report the table as rejected in the session report
    #[default]
    Error,
    /// Drop the table's events silently
    Drop,
}

/// Dispatcher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub mode: DispatchMode,

    #[serde(default)]
    pub record_error_policy: RecordErrorPolicy,

    #[serde(default)]
    pub reject_policy: RejectPolicy,

    /// Batches buffered per table in worker mode before the session waits
    #[serde(default = "default_worker_queue_depth")]
    pub worker_queue_depth: usize,
}

fn default_worker_queue_depth() -> usize {
    64
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            mode: DispatchMode::default(),
            record_error_policy: RecordErrorPolicy::default(),
            reject_policy: RejectPolicy::default(),
            worker_queue_depth: default_worker_queue_depth(),
        }
    }
}

/// Session settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session deadline in milliseconds (0 = none)
    #[serde(default)]
    pub timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. tablemux.toml (base configuration)
    /// 2. tablemux.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (TABLEMUX_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("tablemux.toml"))
            .merge(Toml::file("tablemux.local.toml"))
            .merge(Env::prefixed("TABLEMUX_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("TABLEMUX_").split("__"))
            .extract()
    }
}
