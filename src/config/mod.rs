//! Configuration loading and management

use crate::core::error::SyncError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Auth-related settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    /// Idle time after which a session is logged out (0 disables)
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
        }
    }
}

impl AuthConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

/// Per-connection timing and sizing knobs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timings {
    /// Time allowed to write one frame to the peer
    #[serde(default = "default_write_wait_ms")]
    pub write_wait_ms: u64,

    /// Time allowed to read the next pong from the peer
    #[serde(default = "default_pong_wait_ms")]
    pub pong_wait_ms: u64,

    /// Largest inbound frame accepted, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Capacity of the outbound queue
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,

    /// Upper bound on one token refresh
    #[serde(default = "default_token_refresh_timeout_ms")]
    pub token_refresh_timeout_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            write_wait_ms: default_write_wait_ms(),
            pong_wait_ms: default_pong_wait_ms(),
            max_message_size: default_max_message_size(),
            send_buffer: default_send_buffer(),
            token_refresh_timeout_ms: default_token_refresh_timeout_ms(),
        }
    }
}

/// Upper bound applied to every wait, one day
pub const MAX_WAIT_MS: u64 = 24 * 60 * 60 * 1000;

impl Timings {
    /// Write deadline, capped at [`MAX_WAIT_MS`]
    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms.min(MAX_WAIT_MS))
    }

    /// Read deadline, capped at [`MAX_WAIT_MS`]
    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms.min(MAX_WAIT_MS))
    }

    /// Ping period, 90% of the pong wait so a ping always lands in time
    ///
    /// Never shorter than 1ms.
    pub fn ping_period(&self) -> Duration {
        let pong_wait_ms = self.pong_wait_ms.min(MAX_WAIT_MS);
        Duration::from_millis((pong_wait_ms * 9 / 10).max(1))
    }

    pub fn token_refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.token_refresh_timeout_ms)
    }
}

/// Complete configuration for the synchronization layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    /// Prefix relative addresses are resolved against (must end with `/`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Whether clients may send `patch` messages
    #[serde(default)]
    pub editable: bool,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub timings: Timings,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            editable: false,
            auth: AuthConfig::default(),
            timings: Timings::default(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the engine relies on
    pub fn validate(&self) -> Result<(), SyncError> {
        if !self.base_url.ends_with('/') {
            return Err(SyncError::Config(format!(
                "base_url {:?} must end with '/'",
                self.base_url
            )));
        }
        if self.timings.send_buffer == 0 {
            return Err(SyncError::Config("send_buffer must be > 0".to_string()));
        }
        if self.timings.pong_wait_ms > MAX_WAIT_MS || self.timings.write_wait_ms > MAX_WAIT_MS {
            return Err(SyncError::Config(format!(
                "pong_wait_ms and write_wait_ms must not exceed {MAX_WAIT_MS}"
            )));
        }
        if self.timings.write_wait_ms == 0 {
            return Err(SyncError::Config("write_wait_ms must be > 0".to_string()));
        }
        if self.timings.ping_period() >= self.timings.pong_wait() {
            return Err(SyncError::Config(
                "pong_wait_ms too small to derive a ping period".to_string(),
            ));
        }
        if self.timings.max_message_size == 0 {
            return Err(SyncError::Config(
                "max_message_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.auth.inactivity_timeout_secs = timeout.as_secs();
        self
    }
}

fn default_base_url() -> String {
    "/".to_string()
}

fn default_inactivity_timeout_secs() -> u64 {
    30 * 60
}

fn default_write_wait_ms() -> u64 {
    10_000
}

fn default_pong_wait_ms() -> u64 {
    60_000
}

fn default_max_message_size() -> usize {
    1024 * 1024
}

fn default_send_buffer() -> usize {
    256
}

fn default_token_refresh_timeout_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.base_url, "/");
        assert!(!config.editable);
        assert_eq!(config.timings.send_buffer, 256);
        assert_eq!(config.timings.write_wait(), Duration::from_secs(10));
        assert_eq!(config.timings.pong_wait(), Duration::from_secs(60));
        assert_eq!(config.timings.ping_period(), Duration::from_secs(54));
        assert_eq!(config.timings.max_message_size, 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ping_period_is_shorter_than_pong_wait() {
        let timings = Timings {
            pong_wait_ms: 100,
            ..Default::default()
        };
        assert_eq!(timings.ping_period(), Duration::from_millis(90));
        assert!(timings.ping_period() < timings.pong_wait());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
base_url: /app/
editable: true
timings:
  send_buffer: 16
"#;
        let config = SyncConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.base_url, "/app/");
        assert!(config.editable);
        assert_eq!(config.timings.send_buffer, 16);
        assert_eq!(config.timings.pong_wait_ms, 60_000);
        assert_eq!(config.auth.inactivity_timeout_secs, 1800);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = SyncConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn test_rejects_base_url_without_trailing_slash() {
        let err = SyncConfig::from_yaml_str("base_url: /app").unwrap_err();
        assert!(err.to_string().contains("must end with '/'"));
    }

    #[test]
    fn test_rejects_zero_send_buffer() {
        let config = SyncConfig::default().with_timings(Timings {
            send_buffer: 0,
            ..Default::default()
        });
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_huge_pong_wait_is_an_error_not_a_panic() {
        let err = SyncConfig::from_yaml_str("timings:\n  pong_wait_ms: 3000000000000000000")
            .unwrap_err();
        assert!(err.to_string().contains("must not exceed"));
    }

    #[test]
    fn test_tiny_pong_wait_is_rejected_but_period_stays_positive() {
        let timings = Timings {
            pong_wait_ms: 1,
            ..Default::default()
        };
        assert_eq!(timings.ping_period(), Duration::from_millis(1));

        let config = SyncConfig::default().with_timings(timings);
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_waits_are_capped() {
        let timings = Timings {
            pong_wait_ms: u64::MAX,
            write_wait_ms: u64::MAX,
            ..Default::default()
        };
        assert_eq!(timings.pong_wait(), Duration::from_millis(MAX_WAIT_MS));
        assert_eq!(timings.write_wait(), Duration::from_millis(MAX_WAIT_MS));
        assert!(timings.ping_period() < timings.pong_wait());
    }

    #[test]
    fn test_rejects_malformed_yaml() {
        assert!(SyncConfig::from_yaml_str("editable: [not, a, bool]").is_err());
    }

    #[test]
    fn test_builder_helpers() {
        let config = SyncConfig::default()
            .with_base_url("/x/")
            .with_editable(true)
            .with_inactivity_timeout(Duration::from_secs(5));
        assert_eq!(config.base_url, "/x/");
        assert!(config.editable);
        assert_eq!(config.auth.inactivity_timeout(), Duration::from_secs(5));
    }
}
