//! Configuration loading with hot-update support.
//!
//! A configuration type implements [`Config`]: it is parsed from a TOML
//! table, checked by `validate`, and can absorb the hot-updatable subset of a
//! newer version of itself through `hot_update`. [`ConfigManager`] holds the
//! live value behind an `ArcSwap` so readers never block a reload.

mod manager;

pub use manager::ConfigManager;

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub trait Config: DeserializeOwned + Send + Sync + 'static {
    /// Build the configuration from a parsed TOML table. Missing keys take
    /// their serde defaults.
    fn from_toml(value: &toml::Value) -> Result<Self, ConfigError> {
        Ok(value.clone().try_into::<Self>()?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Copy the fields that may change at runtime from `newer`.
    fn hot_update(&mut self, _newer: &Self) {}
}

/// Check that `value` lies in `min..=max`, naming `key` on failure.
pub fn check_range<T>(key: &'static str, value: T, min: T, max: T) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(ConfigError::invalid(
            key,
            format!("{} is outside {}..={}", value, min, max),
        ));
    }
    Ok(())
}
