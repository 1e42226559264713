//! Channel configuration.

use std::time::Duration;

use fusebridge_config::{check_range, Config, ConfigError};
use fusebridge_proto::IN_HEADER_SIZE;
use serde::{Deserialize, Serialize};

/// Limits and timeouts applied to every connection a registry creates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Requests a connection accepts before further senders wait for a slot.
    #[serde(default = "default_max_outstanding")]
    pub max_outstanding: usize,

    /// Largest envelope, in bytes, accepted in either direction.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// How long a sender waits for its reply, in milliseconds. 0 waits forever.
    /// Hot-updatable.
    #[serde(default)]
    pub request_timeout_ms: u64,
}

fn default_max_outstanding() -> usize {
    1024
}

fn default_max_message_size() -> usize {
    128 * 1024 + IN_HEADER_SIZE
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_outstanding: default_max_outstanding(),
            max_message_size: default_max_message_size(),
            request_timeout_ms: 0,
        }
    }
}

impl ChannelConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl Config for ChannelConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_range("max_outstanding", self.max_outstanding, 1, 65536)?;
        if self.max_message_size < IN_HEADER_SIZE {
            return Err(ConfigError::invalid(
                "max_message_size",
                format!("must hold at least a {}-byte header", IN_HEADER_SIZE),
            ));
        }
        // Envelope lengths travel as u32.
        check_range("max_message_size", self.max_message_size, IN_HEADER_SIZE, u32::MAX as usize)
    }

    fn hot_update(&mut self, newer: &Self) {
        self.request_timeout_ms = newer.request_timeout_ms;
    }
}
