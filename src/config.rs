//! Bridge Configuration
//!
//! Loaded from TOML. A missing file means defaults; a malformed one is an error.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BridgeError, BridgeResult};

/// What a failed pause/resume/cancel does to the session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlFailurePolicy {
    /// Record the message, leave the status where it was so the user can retry
    #[default]
    KeepStatus,
    /// Record the message and move the session to `error`
    MarkError,
}

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Privileged helper executable spoken to over stdio
    pub helper_path: Option<PathBuf>,
    pub helper_args: Vec<String>,
    /// Upper bound for one request/reply round trip
    pub request_timeout_ms: u64,
    /// Capacity of each store's change-notification channel
    pub event_buffer: usize,
    pub control_failure_policy: ControlFailurePolicy,
    /// Refuse a second active session on a device that already has one
    pub exclusive_devices: bool,
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            helper_path: None,
            helper_args: Vec::new(),
            request_timeout_ms: 30_000,
            event_buffer: 256,
            control_failure_policy: ControlFailurePolicy::KeepStatus,
            exclusive_devices: true,
            log_level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Default location: `<config dir>/recovery-bridge/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("recovery-bridge").join("config.toml"))
    }

    /// Load from `path`, or from the default location when `path` is `None`
    pub fn load(path: Option<&Path>) -> BridgeResult<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => {
                    debug!("No config directory on this platform, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&text)?;
        info!("Loaded bridge config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> BridgeResult<Self> {
        let config: BridgeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> BridgeResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(BridgeError::Config("request_timeout_ms must be greater than zero".into()));
        }
        if self.event_buffer == 0 {
            return Err(BridgeError::Config("event_buffer must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = BridgeConfig::from_toml(
            r#"
            helper_path = "/usr/libexec/recovery-helper"
            control_failure_policy = "mark_error"
            "#,
        )
        .unwrap();

        assert_eq!(config.helper_path, Some(PathBuf::from("/usr/libexec/recovery-helper")));
        assert_eq!(config.control_failure_policy, ControlFailurePolicy::MarkError);
        assert_eq!(config.request_timeout_ms, 30_000);
        assert!(config.exclusive_devices);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = BridgeConfig::from_toml("request_timeout_ms = 0");
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "event_buffer = 16\nlog_level = \"debug\"").unwrap();

        let config = BridgeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.event_buffer, 16);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, BridgeConfig::default());
    }
}
