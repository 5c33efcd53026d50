//! Session tuning, loadable from a JSON file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use shata_protocol::constants::{
    BUFFER_HIGH_WATER_MARK, BUFFER_POLL_INTERVAL, CONNECT_TIMEOUT,
};
use shata_transfer::SendOptions;

use crate::error::SessionError;

/// Knobs shared by sender and receiver sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub high_water_mark: usize,
    #[serde(rename = "pollIntervalMs", with = "millis")]
    pub poll_interval: Duration,
    #[serde(rename = "connectTimeoutMs", with = "millis")]
    pub connect_timeout: Duration,
    /// Registration attempts before the sender gives up on finding a free code.
    pub max_registration_attempts: u32,
    /// Fail instead of finishing when the assembled size differs from the
    /// announced size.
    pub strict_size_check: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            high_water_mark: BUFFER_HIGH_WATER_MARK,
            poll_interval: BUFFER_POLL_INTERVAL,
            connect_timeout: CONNECT_TIMEOUT,
            max_registration_attempts: 16,
            strict_size_check: false,
        }
    }
}

impl SessionConfig {
    /// Reads and validates a JSON config file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("{}: {e}", path.display())))?;
        let config: SessionConfig = serde_json::from_str(&content)
            .map_err(|e| SessionError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "session config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.poll_interval.is_zero() {
            return Err(SessionError::Config("pollIntervalMs must be positive".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(SessionError::Config("connectTimeoutMs must be positive".into()));
        }
        if self.max_registration_attempts == 0 {
            return Err(SessionError::Config(
                "maxRegistrationAttempts must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn send_options(&self) -> SendOptions {
        SendOptions {
            high_water_mark: self.high_water_mark,
            poll_interval: self.poll_interval,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
