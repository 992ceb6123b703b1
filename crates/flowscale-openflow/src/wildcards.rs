//! `ofp_flow_wildcards` bits.
//!
//! The two network address fields are not single bits but 6-bit counts of
//! ignored low-order address bits. A count of 0 matches the full address,
//! 32 or more ignores it entirely.

pub const OFPFW_IN_PORT: u32 = 1 << 0;
pub const OFPFW_DL_VLAN: u32 = 1 << 1;
pub const OFPFW_DL_SRC: u32 = 1 << 2;
pub const OFPFW_DL_DST: u32 = 1 << 3;
pub const OFPFW_DL_TYPE: u32 = 1 << 4;
pub const OFPFW_NW_PROTO: u32 = 1 << 5;
pub const OFPFW_TP_SRC: u32 = 1 << 6;
pub const OFPFW_TP_DST: u32 = 1 << 7;

pub const OFPFW_NW_SRC_SHIFT: u32 = 8;
pub const OFPFW_NW_SRC_BITS: u32 = 6;
pub const OFPFW_NW_SRC_MASK: u32 = ((1 << OFPFW_NW_SRC_BITS) - 1) << OFPFW_NW_SRC_SHIFT;
pub const OFPFW_NW_SRC_ALL: u32 = 32 << OFPFW_NW_SRC_SHIFT;

pub const OFPFW_NW_DST_SHIFT: u32 = 14;
pub const OFPFW_NW_DST_BITS: u32 = 6;
pub const OFPFW_NW_DST_MASK: u32 = ((1 << OFPFW_NW_DST_BITS) - 1) << OFPFW_NW_DST_SHIFT;
pub const OFPFW_NW_DST_ALL: u32 = 32 << OFPFW_NW_DST_SHIFT;

pub const OFPFW_DL_VLAN_PCP: u32 = 1 << 20;
pub const OFPFW_NW_TOS: u32 = 1 << 21;

/// Wildcard all fields.
pub const OFPFW_ALL: u32 = (1 << 22) - 1;

/// Wildcards for a network address match: everything is ignored except the
/// ethertype and the leading `prefix_len` bits of the address field found
/// at `shift`.
pub const fn network_prefix(shift: u32, prefix_len: u8) -> u32 {
    let ignored = 32 - prefix_len as u32;
    (OFPFW_ALL & !OFPFW_DL_TYPE & !(0x3fu32 << shift)) | (ignored << shift)
}

/// Number of ignored address bits encoded at `shift`, capped at 32.
pub const fn ignored_bits(wildcards: u32, shift: u32) -> u32 {
    let n = (wildcards >> shift) & 0x3f;
    if n > 32 {
        32
    } else {
        n
    }
}
