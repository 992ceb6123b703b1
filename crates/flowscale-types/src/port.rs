//! Switch port types.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An OpenFlow 1.0 port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortNo(u16);

impl PortNo {
    /// Highest number usable by a physical port.
    pub const MAX: PortNo = PortNo(0xff00);

    /// "No port" (`OFPP_NONE`), used to wildcard the output port of deletes.
    pub const NONE: PortNo = PortNo(0xffff);

    pub const fn new(port: u16) -> Self {
        PortNo(port)
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns true for numbers a physical switch port can carry.
    pub const fn is_physical(&self) -> bool {
        self.0 != 0 && self.0 <= Self::MAX.0
    }
}

impl fmt::Display for PortNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PortNo {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u16>()
            .map(PortNo)
            .map_err(|_| ParseError::InvalidPort(s.to_string()))
    }
}

impl From<u16> for PortNo {
    fn from(port: u16) -> Self {
        PortNo(port)
    }
}

/// Link state of a switch port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// Link is down (default until the switch says otherwise).
    #[default]
    Down,
    /// Link is up.
    Up,
}

impl LinkState {
    /// `OFPPS_LINK_DOWN` bit of `ofp_phy_port.state`.
    pub const LINK_DOWN_BIT: u32 = 1;

    /// Derives the link state from the protocol port `state` bitfield.
    pub const fn from_state_bits(state: u32) -> Self {
        if state & Self::LINK_DOWN_BIT == 0 {
            LinkState::Up
        } else {
            LinkState::Down
        }
    }

    pub const fn is_up(&self) -> bool {
        matches!(self, LinkState::Up)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Up => write!(f, "up"),
            LinkState::Down => write!(f, "down"),
        }
    }
}

/// A port and its link state, as listed in a switch features reply or
/// carried by a port-status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortStatus {
    pub port: PortNo,
    pub state: LinkState,
}

impl PortStatus {
    pub const fn new(port: PortNo, state: LinkState) -> Self {
        Self { port, state }
    }

    pub const fn up(port: u16) -> Self {
        Self::new(PortNo(port), LinkState::Up)
    }

    pub const fn down(port: u16) -> Self {
        Self::new(PortNo(port), LinkState::Down)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_port_parse() {
        assert_eq!("7".parse::<PortNo>().unwrap(), PortNo::new(7));
        assert_eq!(" 12 ".parse::<PortNo>().unwrap(), PortNo::new(12));
        assert!("-1".parse::<PortNo>().is_err());
        assert!("eth0".parse::<PortNo>().is_err());
    }

    #[test]
    fn test_port_physical() {
        assert!(PortNo::new(1).is_physical());
        assert!(!PortNo::new(0).is_physical());
        assert!(!PortNo::NONE.is_physical());
    }

    #[test]
    fn test_link_state_from_bits() {
        assert_eq!(LinkState::from_state_bits(0), LinkState::Up);
        assert_eq!(LinkState::from_state_bits(1), LinkState::Down);
        // STP bits do not affect link state
        assert_eq!(LinkState::from_state_bits(0x200), LinkState::Up);
        assert_eq!(LinkState::from_state_bits(0x201), LinkState::Down);
    }

    #[test]
    fn test_display() {
        assert_eq!(PortNo::new(3).to_string(), "3");
        assert_eq!(LinkState::Up.to_string(), "up");
        assert_eq!(PortStatus::down(4).state.to_string(), "down");
    }
}
