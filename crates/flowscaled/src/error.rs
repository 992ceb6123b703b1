//! Error types for the flowscale engine.
//!
//! Nothing here is fatal to the daemon: the controller entry points log
//! these and carry on.

use flowscale_types::{DatapathId, ParseError, PartitionError};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for flowscale operations.
pub type Result<T> = std::result::Result<T, FlowscaleError>;

/// Errors that can occur while configuring, generating or deploying rules.
#[derive(Debug, Error)]
pub enum FlowscaleError {
    /// A policy or daemon setting could not be parsed or is inconsistent.
    #[error("Invalid configuration for {field}: {message}")]
    Configuration {
        /// The offending field.
        field: String,
        /// Error message.
        message: String,
    },

    /// A prefix value had no flow budget left to partition with.
    #[error("Rule generation failed for group {group_id}: {source}")]
    PartitionBudget {
        /// The group whose generation was aborted.
        group_id: u32,
        #[source]
        source: PartitionError,
    },

    /// The switch is not registered or not currently connected.
    #[error("Switch {0} is not connected")]
    SwitchNotConnected(DatapathId),

    /// Writing to or flushing a switch failed.
    #[error("Transport error on switch {dpid}: {source}")]
    Transport {
        dpid: DatapathId,
        #[source]
        source: io::Error,
    },

    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Group {0} not found")]
    GroupNotFound(u32),

    #[error("Group {0} already exists")]
    GroupExists(u32),
}

impl FlowscaleError {
    /// Creates a configuration error.
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error from a failed literal parse.
    pub fn parse(field: impl Into<String>, err: ParseError) -> Self {
        Self::configuration(field, err.to_string())
    }

    /// Returns true for errors caused by the policy text itself.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FlowscaleError::Configuration { .. } | FlowscaleError::ConfigFile { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlowscaleError::configuration("max_flows", "not a number: x");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for max_flows: not a number: x"
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn test_switch_not_connected() {
        let err = FlowscaleError::SwitchNotConnected(DatapathId::new(1));
        assert_eq!(
            err.to_string(),
            "Switch 00:00:00:00:00:00:00:01 is not connected"
        );
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_transport_error() {
        let err = FlowscaleError::Transport {
            dpid: DatapathId::new(0xa),
            source: io::Error::new(io::ErrorKind::BrokenPipe, "switch channel closed"),
        };
        assert_eq!(
            err.to_string(),
            "Transport error on switch 00:00:00:00:00:00:00:0a: switch channel closed"
        );
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_partition_budget_source() {
        let prefix = "10.0.0.0/8".parse().unwrap();
        let err = FlowscaleError::PartitionBudget {
            group_id: 4,
            source: PartitionError::NonPositiveBudget { prefix },
        };
        assert_eq!(
            err.to_string(),
            "Rule generation failed for group 4: flow budget for 10.0.0.0/8 must be positive"
        );
    }
}
