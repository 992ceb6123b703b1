//! Common flowscale types for OpenFlow traffic steering.
//!
//! This crate provides type-safe representations of the network primitives
//! used throughout the flowscale control plane:
//!
//! - [`Ipv4Prefix`]: IPv4 network prefixes (CIDR notation) and their
//!   partitioning into equally sized sub-prefixes
//! - [`DatapathId`]: 64-bit OpenFlow switch identifiers
//! - [`PortNo`]: OpenFlow 1.0 switch port numbers
//! - [`LinkState`]: link up/down as reported by port status

mod datapath;
mod ip;
mod port;

pub use datapath::{parse_hex_u16, DatapathId};
pub use ip::{Ipv4Prefix, PartitionError, IPV4_MAX_PREFIX_LEN};
pub use port::{LinkState, PortNo, PortStatus};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid datapath id: {0}")]
    InvalidDatapathId(String),

    #[error("invalid hex value: {0}")]
    InvalidHex(String),

    #[error("invalid port number: {0}")]
    InvalidPort(String),
}
