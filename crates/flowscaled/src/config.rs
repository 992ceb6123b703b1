//! Configuration file support for flowscaled
//!
//! Loads and validates daemon settings from TOML files.
//! Default location: /etc/flowscale/flowscaled.toml

use crate::deploy::BatchPolicy;
use crate::error::{FlowscaleError, Result};
use crate::group::GroupSpec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/flowscale/flowscaled.toml";

/// Rule deployment settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Flow-mods written to a switch before flushing and pausing
    #[serde(default = "default_max_flows_per_batch")]
    pub max_flows_per_batch: usize,

    /// Pause after each full batch, in milliseconds
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,

    /// Starting value of each switch's automatic priority counter
    #[serde(default = "default_initial_priority")]
    pub initial_priority: u16,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of plain text
    #[serde(default)]
    pub json: bool,
}

/// Complete flowscaled configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowscaleConfig {
    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Groups configured at startup
    #[serde(default, rename = "group")]
    pub groups: Vec<GroupSpec>,
}

fn default_max_flows_per_batch() -> usize {
    100
}

fn default_batch_pause_ms() -> u64 {
    5000
}

fn default_initial_priority() -> u16 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_flows_per_batch: default_max_flows_per_batch(),
            batch_pause_ms: default_batch_pause_ms(),
            initial_priority: default_initial_priority(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl FlowscaleConfig {
    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| FlowscaleError::configuration("config", e.to_string()))
    }

    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(FlowscaleError::ConfigFile {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Load from the default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Get the batch pause as Duration
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.controller.batch_pause_ms)
    }

    /// Batching discipline for every write path.
    pub fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy::new(self.controller.max_flows_per_batch, self.batch_pause())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.controller.max_flows_per_batch == 0 {
            return Err(FlowscaleError::configuration(
                "controller.max_flows_per_batch",
                "must be > 0",
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(FlowscaleError::configuration(
                "logging.level",
                "must not be empty",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = FlowscaleConfig::default();
        assert_eq!(config.controller.max_flows_per_batch, 100);
        assert_eq!(config.controller.batch_pause_ms, 5000);
        assert_eq!(config.controller.initial_priority, 100);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = FlowscaleConfig::from_toml(
            r#"
            [controller]
            max_flows_per_batch = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.controller.max_flows_per_batch, 25);
        assert_eq!(config.controller.batch_pause_ms, 5000);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_batch_policy() {
        let mut config = FlowscaleConfig::default();
        config.controller.max_flows_per_batch = 10;
        config.controller.batch_pause_ms = 250;
        let policy = config.batch_policy();
        assert_eq!(policy.max_flows_per_batch, 10);
        assert_eq!(policy.pause, Duration::from_millis(250));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = FlowscaleConfig::default();
        config.controller.max_flows_per_batch = 0;
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_invalid_toml() {
        let err = FlowscaleConfig::from_toml("[controller]\nmax_flows_per_batch = \"lots\"")
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[controller]\nbatch_pause_ms = 10\n\n[logging]\nlevel = \"debug\""
        )
        .unwrap();

        let config = FlowscaleConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.controller.batch_pause_ms, 10);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_group_tables() {
        let config = FlowscaleConfig::from_toml(
            r#"
            [[group]]
            id = "1"
            name = "web"
            input_switch = "00:00:00:00:00:00:00:01"
            output_switch = "00:00:00:00:00:00:00:02"
            output_ports = "1,2"
            kind = "1"
            priority = "100"
            values = "10.0.0.0/16"
            max_flows = "64"

            [[group]]
            id = "2"
            input_switch = "1"
            output_switch = "2"
            kind = "3"
            priority = "10"
            values = "0806"
            max_flows = "1"
            "#,
        )
        .unwrap();
        assert_eq!(config.groups.len(), 2);
        assert_eq!(config.groups[0].name, "web");
        assert_eq!(config.groups[1].output_ports, "");
        assert!(config.groups[1].parse().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FlowscaleConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, FlowscaleConfig::default());
    }
}
