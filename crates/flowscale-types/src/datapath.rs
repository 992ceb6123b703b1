//! Datapath id type with controller-style hex parsing and formatting.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 64-bit OpenFlow datapath id identifying one switch.
///
/// # Examples
///
/// ```
/// use flowscale_types::DatapathId;
///
/// let dpid: DatapathId = "00:00:00:00:00:00:00:2a".parse().unwrap();
/// assert_eq!(dpid.as_u64(), 42);
/// assert_eq!(dpid.to_string(), "00:00:00:00:00:00:00:2a");
///
/// // Plain hex is accepted too
/// let dpid2: DatapathId = "0x2a".parse().unwrap();
/// assert_eq!(dpid, dpid2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatapathId(u64);

impl DatapathId {
    /// Creates a datapath id from its numeric value.
    pub const fn new(value: u64) -> Self {
        DatapathId(value)
    }

    /// Returns the numeric value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DatapathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

impl FromStr for DatapathId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_u64(s, 8)
            .map(DatapathId)
            .ok_or_else(|| ParseError::InvalidDatapathId(s.to_string()))
    }
}

impl From<u64> for DatapathId {
    fn from(value: u64) -> Self {
        DatapathId(value)
    }
}

impl TryFrom<String> for DatapathId {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DatapathId> for String {
    fn from(dpid: DatapathId) -> Self {
        dpid.to_string()
    }
}

/// Parses a 16-bit hex code such as an ethertype.
///
/// Accepts `0800`, `0x0800` and the octet form `08:00`.
pub fn parse_hex_u16(s: &str) -> Result<u16, ParseError> {
    parse_hex_u64(s, 2)
        .and_then(|v| u16::try_from(v).ok())
        .ok_or_else(|| ParseError::InvalidHex(s.to_string()))
}

/// Parses either colon separated hex octets (at most `max_octets` of them)
/// or a plain hex string with an optional `0x` prefix.
fn parse_hex_u64(s: &str, max_octets: usize) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if s.contains(':') {
        let octets: Vec<&str> = s.split(':').collect();
        if octets.len() > max_octets {
            return None;
        }
        let mut value = 0u64;
        for octet in octets {
            if octet.is_empty() || octet.len() > 2 {
                return None;
            }
            value = (value << 8) | u64::from(u8::from_str_radix(octet, 16).ok()?);
        }
        return Some(value);
    }

    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() || digits.len() > max_octets * 2 {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}
