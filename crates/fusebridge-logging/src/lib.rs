//! Process-wide `tracing` setup shared by the bridge binaries.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

pub use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("unknown log rotation {0:?} (expected hourly, daily or never)")]
    UnknownRotation(String),

    #[error("failed to open log directory: {0}")]
    Appender(#[from] InitError),

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// The `[log]` section of a config file. Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive such as `info` or `fusebridge_core=trace`.
    /// Overridden by `RUST_LOG`.
    pub level: String,

    /// Write rolling log files here as well. Unset means console only.
    pub log_dir: Option<PathBuf>,

    pub file_prefix: String,

    /// `hourly`, `daily` or `never`.
    pub rotation: String,

    /// Emit one JSON object per event instead of text.
    pub json_format: bool,

    /// Log to stderr.
    pub console_output: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            file_prefix: "fusebridge".to_string(),
            rotation: "daily".to_string(),
            json_format: false,
            console_output: true,
        }
    }
}

impl LogConfig {
    pub fn rotation(&self) -> Result<Rotation, LogError> {
        match self.rotation.as_str() {
            "hourly" => Ok(Rotation::HOURLY),
            "daily" => Ok(Rotation::DAILY),
            "never" => Ok(Rotation::NEVER),
            other => Err(LogError::UnknownRotation(other.to_string())),
        }
    }
}

type DynLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn console_layer(config: &LogConfig) -> Option<DynLayer> {
    if !config.console_output {
        return None;
    }
    let layer = fmt::layer().with_writer(std::io::stderr);
    Some(if config.json_format {
        layer.json().boxed()
    } else {
        layer.boxed()
    })
}

fn file_layer(config: &LogConfig) -> Result<Option<(DynLayer, WorkerGuard)>, LogError> {
    let Some(dir) = config.log_dir.as_ref() else {
        return Ok(None);
    };
    let appender = RollingFileAppender::builder()
        .rotation(config.rotation()?)
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log")
        .build(dir)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer().with_ansi(false).with_writer(writer);
    let layer = if config.json_format {
        layer.json().boxed()
    } else {
        layer.boxed()
    };
    Ok(Some((layer, guard)))
}

/// Install the global subscriber. Call once at startup.
///
/// Keep the returned guard alive for as long as the process logs; dropping
/// it flushes the file writer.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, LogError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let mut layers: Vec<DynLayer> = Vec::new();
    layers.extend(console_layer(config));
    let guard = match file_layer(config)? {
        Some((layer, guard)) => {
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.log_dir.is_none());
        assert!(config.console_output);
        assert_eq!(config.rotation().unwrap(), Rotation::DAILY);
    }

    #[test]
    fn test_unknown_rotation() {
        let config = LogConfig {
            rotation: "weekly".into(),
            ..LogConfig::default()
        };
        let err = config.rotation().unwrap_err();
        assert!(err.to_string().contains("weekly"));
    }

    #[test]
    fn test_partial_toml() {
        let config: LogConfig = toml::from_str("level = \"debug\"\njson_format = true").unwrap();
        assert_eq!(config.level, "debug");
        assert!(config.json_format);
        assert_eq!(config.file_prefix, "fusebridge");
        assert_eq!(config.rotation, "daily");
    }

    #[test]
    fn test_console_layer_optional() {
        let config = LogConfig {
            console_output: false,
            ..LogConfig::default()
        };
        assert!(console_layer(&config).is_none());
        assert!(file_layer(&config).unwrap().is_none());
    }
}
