//! `ofp_match` and the per-kind match builders.

use bytes::BufMut;
use flowscale_types::{Ipv4Prefix, IPV4_MAX_PREFIX_LEN};
use std::fmt;
use std::net::Ipv4Addr;

use crate::wildcards::{self, *};

/// Size of `ofp_match` on the wire.
pub const OFP_MATCH_LEN: usize = 40;

/// Ethertype of IPv4 frames.
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// Which header field of a pair (source or destination) a match pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportDirection {
    #[default]
    Source,
    Destination,
}

impl TransportDirection {
    /// Returns the opposite direction.
    pub const fn reversed(self) -> Self {
        match self {
            Self::Source => Self::Destination,
            Self::Destination => Self::Source,
        }
    }
}

impl fmt::Display for TransportDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Destination => write!(f, "destination"),
        }
    }
}

/// An OpenFlow 1.0 match: header field values plus the wildcard bits saying
/// which of them (and how many address bits) the switch compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowMatch {
    pub wildcards: u32,
    pub in_port: u16,
    pub dl_src: [u8; 6],
    pub dl_dst: [u8; 6],
    pub dl_vlan: u16,
    pub dl_vlan_pcp: u8,
    pub dl_type: u16,
    pub nw_tos: u8,
    pub nw_proto: u8,
    pub nw_src: Ipv4Addr,
    pub nw_dst: Ipv4Addr,
    pub tp_src: u16,
    pub tp_dst: u16,
}

impl Default for FlowMatch {
    fn default() -> Self {
        Self {
            wildcards: OFPFW_ALL,
            in_port: 0,
            dl_src: [0; 6],
            dl_dst: [0; 6],
            dl_vlan: 0,
            dl_vlan_pcp: 0,
            dl_type: 0,
            nw_tos: 0,
            nw_proto: 0,
            nw_src: Ipv4Addr::UNSPECIFIED,
            nw_dst: Ipv4Addr::UNSPECIFIED,
            tp_src: 0,
            tp_dst: 0,
        }
    }
}

impl FlowMatch {
    /// Matches IPv4 packets whose source address is inside `prefix`.
    pub fn network_source(prefix: Ipv4Prefix) -> Self {
        Self::network(TransportDirection::Source, prefix)
    }

    /// Matches IPv4 packets whose destination address is inside `prefix`.
    pub fn network_destination(prefix: Ipv4Prefix) -> Self {
        Self::network(TransportDirection::Destination, prefix)
    }

    /// Matches IPv4 packets on one address field.
    pub fn network(direction: TransportDirection, prefix: Ipv4Prefix) -> Self {
        let mut m = Self {
            dl_type: ETHERTYPE_IPV4,
            ..Self::default()
        };
        match direction {
            TransportDirection::Source => {
                m.nw_src = prefix.network();
                m.wildcards = wildcards::network_prefix(OFPFW_NW_SRC_SHIFT, prefix.prefix_len());
            }
            TransportDirection::Destination => {
                m.nw_dst = prefix.network();
                m.wildcards = wildcards::network_prefix(OFPFW_NW_DST_SHIFT, prefix.prefix_len());
            }
        }
        m
    }

    /// Matches IPv4 packets of `protocol` with the given source or
    /// destination transport port.
    pub fn transport(protocol: u8, direction: TransportDirection, port: u16) -> Self {
        let mut m = Self {
            dl_type: ETHERTYPE_IPV4,
            nw_proto: protocol,
            ..Self::default()
        };
        match direction {
            TransportDirection::Source => {
                m.tp_src = port;
                m.wildcards = OFPFW_ALL ^ OFPFW_DL_TYPE ^ OFPFW_NW_PROTO ^ OFPFW_TP_SRC;
            }
            TransportDirection::Destination => {
                m.tp_dst = port;
                m.wildcards = OFPFW_ALL ^ OFPFW_DL_TYPE ^ OFPFW_NW_PROTO ^ OFPFW_TP_DST;
            }
        }
        m
    }

    /// Matches frames of one ethertype.
    pub fn ether_type(ether_type: u16) -> Self {
        Self {
            dl_type: ether_type,
            wildcards: OFPFW_ALL ^ OFPFW_DL_TYPE,
            ..Self::default()
        }
    }

    /// Returns the address field and prefix this match pins, if it is a
    /// network-prefix match built by [`FlowMatch::network`].
    pub fn network_prefix(&self) -> Option<(TransportDirection, Ipv4Prefix)> {
        if self.wildcards & OFPFW_DL_TYPE != 0 || self.dl_type != ETHERTYPE_IPV4 {
            return None;
        }
        let src_ignored = wildcards::ignored_bits(self.wildcards, OFPFW_NW_SRC_SHIFT);
        let dst_ignored = wildcards::ignored_bits(self.wildcards, OFPFW_NW_DST_SHIFT);

        let (direction, addr, ignored) = match (src_ignored < 32, dst_ignored < 32) {
            (true, false) => (TransportDirection::Source, self.nw_src, src_ignored),
            (false, true) => (TransportDirection::Destination, self.nw_dst, dst_ignored),
            _ => return None,
        };
        let len = IPV4_MAX_PREFIX_LEN - ignored as u8;
        Ipv4Prefix::new(addr, len).ok().map(|p| (direction, p))
    }

    /// Returns the same network-prefix match on the opposite address field,
    /// or `None` for any other kind of match.
    pub fn direction_swapped(&self) -> Option<Self> {
        self.network_prefix()
            .map(|(direction, prefix)| Self::network(direction.reversed(), prefix))
    }

    /// Writes the 40-byte wire form.
    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u32(self.wildcards);
        dst.put_u16(self.in_port);
        dst.put_slice(&self.dl_src);
        dst.put_slice(&self.dl_dst);
        dst.put_u16(self.dl_vlan);
        dst.put_u8(self.dl_vlan_pcp);
        dst.put_u8(0);
        dst.put_u16(self.dl_type);
        dst.put_u8(self.nw_tos);
        dst.put_u8(self.nw_proto);
        dst.put_bytes(0, 2);
        dst.put_u32(u32::from(self.nw_src));
        dst.put_u32(u32::from(self.nw_dst));
        dst.put_u16(self.tp_src);
        dst.put_u16(self.tp_dst);
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<String> = Vec::new();
        if self.wildcards & OFPFW_DL_TYPE == 0 {
            fields.push(format!("dl_type=0x{:04x}", self.dl_type));
        }
        if self.wildcards & OFPFW_NW_PROTO == 0 {
            fields.push(format!("nw_proto={}", self.nw_proto));
        }
        let src_ignored = wildcards::ignored_bits(self.wildcards, OFPFW_NW_SRC_SHIFT);
        if src_ignored < 32 {
            fields.push(format!("nw_src={}/{}", self.nw_src, 32 - src_ignored));
        }
        let dst_ignored = wildcards::ignored_bits(self.wildcards, OFPFW_NW_DST_SHIFT);
        if dst_ignored < 32 {
            fields.push(format!("nw_dst={}/{}", self.nw_dst, 32 - dst_ignored));
        }
        if self.wildcards & OFPFW_TP_SRC == 0 {
            fields.push(format!("tp_src={}", self.tp_src));
        }
        if self.wildcards & OFPFW_TP_DST == 0 {
            fields.push(format!("tp_dst={}", self.tp_dst));
        }
        if fields.is_empty() {
            write!(f, "*")
        } else {
            write!(f, "{}", fields.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn prefix(s: &str) -> Ipv4Prefix {
        s.parse().unwrap()
    }

    #[test]
    fn test_network_source_match() {
        let m = FlowMatch::network_source(prefix("10.0.32.0/19"));
        assert_eq!(m.dl_type, ETHERTYPE_IPV4);
        assert_eq!(m.nw_src, Ipv4Addr::new(10, 0, 32, 0));
        assert_eq!(m.wildcards & OFPFW_DL_TYPE, 0);
        assert_eq!(wildcards::ignored_bits(m.wildcards, OFPFW_NW_SRC_SHIFT), 13);
        assert_eq!(wildcards::ignored_bits(m.wildcards, OFPFW_NW_DST_SHIFT), 32);
        assert_eq!(m.to_string(), "dl_type=0x0800,nw_src=10.0.32.0/19");
    }

    #[test]
    fn test_network_pair_roundtrip() {
        let p = prefix("192.168.4.0/22");
        let src = FlowMatch::network_source(p);
        let dst = FlowMatch::network_destination(p);

        assert_eq!(src.network_prefix(), Some((TransportDirection::Source, p)));
        assert_eq!(dst.network_prefix(), Some((TransportDirection::Destination, p)));
        assert_eq!(src.direction_swapped(), Some(dst));
        assert_eq!(dst.direction_swapped(), Some(src));
        assert_ne!(src, dst);
    }

    #[test]
    fn test_transport_match() {
        let m = FlowMatch::transport(6, TransportDirection::Destination, 443);
        assert_eq!(m.nw_proto, 6);
        assert_eq!(m.tp_dst, 443);
        assert_eq!(m.tp_src, 0);
        assert_eq!(
            m.wildcards,
            OFPFW_ALL & !(OFPFW_DL_TYPE | OFPFW_NW_PROTO | OFPFW_TP_DST)
        );
        assert_eq!(m.to_string(), "dl_type=0x0800,nw_proto=6,tp_dst=443");
        assert_eq!(m.network_prefix(), None);
    }

    #[test]
    fn test_ether_type_match() {
        let m = FlowMatch::ether_type(0x86dd);
        assert_eq!(m.wildcards, OFPFW_ALL & !OFPFW_DL_TYPE);
        assert_eq!(m.to_string(), "dl_type=0x86dd");
        assert_eq!(m.direction_swapped(), None);
    }

    #[test]
    fn test_encode_layout() {
        let m = FlowMatch::network_destination(prefix("10.1.0.0/16"));
        let mut buf = Vec::new();
        m.encode(&mut buf);

        assert_eq!(buf.len(), OFP_MATCH_LEN);
        assert_eq!(&buf[0..4], &m.wildcards.to_be_bytes());
        assert_eq!(&buf[22..24], &[0x08, 0x00]);
        assert_eq!(&buf[28..32], &[0, 0, 0, 0]);
        assert_eq!(&buf[32..36], &[10, 1, 0, 0]);
    }
}
