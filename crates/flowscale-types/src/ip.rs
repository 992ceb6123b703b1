//! IPv4 prefix type with safe parsing and sub-prefix partitioning.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Longest possible IPv4 prefix.
pub const IPV4_MAX_PREFIX_LEN: u8 = 32;

/// Error returned when a prefix cannot be partitioned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartitionError {
    #[error("flow budget for {prefix} must be positive")]
    NonPositiveBudget { prefix: Ipv4Prefix },
}

/// An IPv4 prefix in CIDR notation (e.g., 10.0.0.0/16).
///
/// Host bits are cleared on construction, so the stored address is always
/// the network address of the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Prefix {
    network: Ipv4Addr,
    len: u8,
}

impl Ipv4Prefix {
    /// Creates a new prefix, masking off any host bits of `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` exceeds 32.
    pub fn new(address: Ipv4Addr, len: u8) -> Result<Self, ParseError> {
        if len > IPV4_MAX_PREFIX_LEN {
            return Err(ParseError::InvalidIpPrefix(format!(
                "prefix length {} exceeds maximum {}",
                len, IPV4_MAX_PREFIX_LEN
            )));
        }

        let network = Ipv4Addr::from(u32::from(address) & Self::mask_for(len));
        Ok(Ipv4Prefix { network, len })
    }

    /// Returns the network address of this prefix.
    pub const fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Returns the prefix length in bits.
    pub const fn prefix_len(&self) -> u8 {
        self.len
    }

    /// Number of addresses covered by this prefix.
    pub const fn size(&self) -> u64 {
        1u64 << (IPV4_MAX_PREFIX_LEN - self.len)
    }

    /// Returns true if `addr` falls inside this prefix.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & Self::mask_for(self.len) == u32::from(self.network)
    }

    /// Splits this prefix into equally sized, contiguous sub-prefixes.
    ///
    /// The budget is floored to a power of two, `2^bits`, and every
    /// sub-prefix is `bits` longer than this one. The new length is clamped
    /// to /32, in which case only as many /32s as the prefix holds are
    /// produced. A budget of 1 and a /32 input both return the prefix
    /// itself.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionError::NonPositiveBudget`] for a zero budget.
    ///
    /// # Examples
    ///
    /// ```
    /// use flowscale_types::Ipv4Prefix;
    ///
    /// let prefix: Ipv4Prefix = "10.0.0.0/16".parse().unwrap();
    /// let parts = prefix.partition(8).unwrap();
    /// assert_eq!(parts.len(), 8);
    /// assert_eq!(parts[1].to_string(), "10.0.32.0/19");
    /// ```
    pub fn partition(&self, budget: u32) -> Result<Vec<Ipv4Prefix>, PartitionError> {
        if budget == 0 {
            return Err(PartitionError::NonPositiveBudget { prefix: *self });
        }

        // bit length of the budget minus one, i.e. floor(log2(budget))
        let bits = (u32::BITS - 1 - budget.leading_zeros()) as u8;
        let sub_len = self.len.saturating_add(bits).min(IPV4_MAX_PREFIX_LEN);
        let count = 1u64 << (sub_len - self.len);
        let block = 1u64 << (IPV4_MAX_PREFIX_LEN - sub_len);

        let first = Ipv4Prefix {
            network: self.network,
            len: sub_len,
        };
        let parts = std::iter::successors(Some(first), |prev| prev.next_block(block))
            .take(count as usize)
            .collect();

        Ok(parts)
    }

    /// Returns the prefix of the same length that immediately follows this
    /// one in the address space, or `None` past 255.255.255.255.
    fn next_block(&self, block: u64) -> Option<Ipv4Prefix> {
        let next = u64::from(u32::from(self.network)) + block;
        let next = u32::try_from(next).ok()?;
        Some(Ipv4Prefix {
            network: Ipv4Addr::from(next),
            len: self.len,
        })
    }

    const fn mask_for(len: u8) -> u32 {
        if len == 0 {
            0
        } else {
            u32::MAX << (IPV4_MAX_PREFIX_LEN - len)
        }
    }
}

impl fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.len)
    }
}

impl FromStr for Ipv4Prefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr_str, len_str) = s
            .rsplit_once('/')
            .ok_or_else(|| ParseError::InvalidIpPrefix(s.to_string()))?;

        let address: Ipv4Addr = addr_str
            .parse()
            .map_err(|_| ParseError::InvalidIpAddress(addr_str.to_string()))?;
        let len: u8 = len_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;

        Ipv4Prefix::new(address, len)
    }
}

impl TryFrom<String> for Ipv4Prefix {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Ipv4Prefix> for String {
    fn from(prefix: Ipv4Prefix) -> Self {
        prefix.to_string()
    }
}
