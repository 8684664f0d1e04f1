//! Client configuration.

use crate::error::{RealtimeError, Result};
use crate::reconnect::ReconnectPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default cap on simultaneously watched channels.
pub const DEFAULT_MAX_ACTIVE_CHANNELS: usize = 64;

/// Configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Id of the connected user; messages from anyone else count as unread.
    pub user_id: Option<String>,
    /// Contain handler panics so the remaining handlers still get the event.
    pub isolate_handler_panics: bool,
    /// Maximum number of watched channels.
    pub max_active_channels: usize,
    /// Default deadline for [`Client::connected`](crate::Client::connected).
    pub wait_timeout_ms: Option<u64>,
    /// Reconnect backoff.
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            isolate_handler_panics: true,
            max_active_channels: DEFAULT_MAX_ACTIVE_CHANNELS,
            wait_timeout_ms: None,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Set the current user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the default connection wait timeout.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Default connection wait timeout.
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    /// Loads configuration from a JSON file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ClientConfig = serde_json::from_str(&content)
            .map_err(|e| RealtimeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn load_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ClientConfig = serde_yaml::from_str(&content)
            .map_err(|e| RealtimeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration, picking the format from the file extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::load_yaml(path),
            _ => Self::load_json(path),
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_active_channels == 0 {
            return Err(RealtimeError::InvalidConfig(
                "max_active_channels must be at least 1".into(),
            ));
        }

        if matches!(self.user_id.as_deref(), Some("")) {
            return Err(RealtimeError::InvalidConfig("user_id is empty".into()));
        }

        let reconnect = &self.reconnect;
        if reconnect.max_attempts == 0 {
            return Err(RealtimeError::InvalidConfig(
                "reconnect.max_attempts must be at least 1".into(),
            ));
        }

        if reconnect.multiplier < 1.0 {
            return Err(RealtimeError::InvalidConfig(format!(
                "reconnect.multiplier must be >= 1.0, got {}",
                reconnect.multiplier
            )));
        }

        if reconnect.initial_delay_ms > reconnect.max_delay_ms {
            return Err(RealtimeError::InvalidConfig(format!(
                "reconnect.initial_delay_ms ({}) exceeds max_delay_ms ({})",
                reconnect.initial_delay_ms, reconnect.max_delay_ms
            )));
        }

        Ok(())
    }
}
