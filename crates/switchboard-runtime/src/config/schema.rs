//! Configuration schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::value::Value;
use serde::{Deserialize, Serialize};
use switchboard_core::conversation::{DEFAULT_NAMESPACE, StoreSettings};
use switchboard_core::{DispatchSettings, Locale};

use super::error::{ConfigError, ConfigResult};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SwitchboardConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Dispatch limits.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Conversation store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Adapter sections, keyed by `ConfigurableAdapter::adapter_name()`.
    #[serde(default)]
    pub adapters: HashMap<String, Value>,
}

// =============================================================================
// Logging
// =============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace.
    Trace,
    /// Debug.
    Debug,
    /// Info.
    #[default]
    Info,
    /// Warn.
    Warn,
    /// Error.
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line compact output.
    #[default]
    Compact,
    /// Default `fmt` output.
    Full,
    /// Multi-line output for development.
    Pretty,
    /// Newline-delimited JSON.
    #[cfg(feature = "json-log")]
    Json,
}

/// Output destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
    /// The file at `file_path`.
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    /// Span creation.
    #[serde(default)]
    pub new: bool,
    /// Span entry.
    #[serde(default)]
    pub enter: bool,
    /// Span exit.
    #[serde(default)]
    pub exit: bool,
    /// Span close.
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global level. `RUST_LOG` takes precedence.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file, used with `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Span events.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module levels, e.g. `switchboard_core = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            filters: HashMap::new(),
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address every inbound endpoint is served on.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

// =============================================================================
// Dispatch
// =============================================================================

/// Dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Dispatches allowed to run at once.
    #[serde(default = "default_worker_limit")]
    pub worker_limit: usize,

    /// Longest wait for a user lock, in milliseconds.
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,

    /// Deadline of the locked part of a dispatch, in milliseconds.
    #[serde(default)]
    pub dispatch_timeout_ms: Option<u64>,

    /// Locale used when a request carries none.
    #[serde(default = "default_locale")]
    pub default_locale: String,

    /// Store namespace.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_limit: default_worker_limit(),
            lock_timeout_ms: None,
            dispatch_timeout_ms: None,
            default_locale: default_locale(),
            namespace: default_namespace(),
        }
    }
}

fn default_worker_limit() -> usize {
    64
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl DispatchConfig {
    /// Converts to controller settings.
    pub fn to_settings(&self) -> ConfigResult<DispatchSettings> {
        let default_locale = Locale::parse_tag(&self.default_locale)
            .ok_or_else(|| ConfigError::InvalidLocale(self.default_locale.clone()))?;
        Ok(DispatchSettings {
            worker_limit: self.worker_limit,
            lock_timeout: self.lock_timeout_ms.map(Duration::from_millis),
            dispatch_timeout: self.dispatch_timeout_ms.map(Duration::from_millis),
            namespace: self.namespace.clone(),
            default_locale,
        })
    }
}

// =============================================================================
// Store
// =============================================================================

/// Conversation store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Actions a dialog may hold before a follow-up dialog is opened.
    #[serde(default = "default_max_actions")]
    pub max_actions_by_dialog: usize,

    /// Seconds a dialog stays current after its last update.
    #[serde(default = "default_dialog_validity")]
    pub dialog_max_validity_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_actions_by_dialog: default_max_actions(),
            dialog_max_validity_secs: default_dialog_validity(),
        }
    }
}

fn default_max_actions() -> usize {
    1000
}

fn default_dialog_validity() -> u64 {
    60 * 60 * 24
}

impl StoreConfig {
    /// Converts to store settings.
    pub fn to_settings(&self) -> StoreSettings {
        StoreSettings {
            max_actions_by_dialog: self.max_actions_by_dialog,
            dialog_max_validity_secs: self.dialog_max_validity_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_settings_from_config() {
        let config = DispatchConfig {
            lock_timeout_ms: Some(250),
            default_locale: "fr_FR".into(),
            ..Default::default()
        };
        let settings = config.to_settings().unwrap();
        assert_eq!(settings.lock_timeout, Some(Duration::from_millis(250)));
        assert_eq!(settings.dispatch_timeout, None);
        assert_eq!(settings.default_locale.language(), "fr");
        assert_eq!(settings.default_locale.region(), Some("FR"));
    }

    #[test]
    fn unparsable_default_locale_is_an_error() {
        let config = DispatchConfig {
            default_locale: "???".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.to_settings(),
            Err(ConfigError::InvalidLocale(_))
        ));
    }
}
