//! OpenFlow 1.0 wire subset used by the flowscale engine.
//!
//! Only the pieces the rule engine sets are modelled:
//!
//! - [`FlowMatch`]: the 40-byte `ofp_match`, with constructors for the three
//!   policy match kinds (network prefix, transport port, ethertype)
//! - [`ActionOutput`]: the output action
//! - [`FlowMod`]: flow insertion and strict deletion messages
//! - [`FlowModCodec`]: a `tokio_util` encoder writing flow-mods onto a
//!   switch control channel with increasing transaction ids
//!
//! Handshake, echo, barrier and every other message type are handled by the
//! connection layer and are not part of this crate.

mod action;
mod codec;
mod flow_match;
mod flow_mod;
pub mod wildcards;

pub use action::{ActionOutput, OFP_ACTION_OUTPUT_LEN};
pub use codec::FlowModCodec;
pub use flow_match::{FlowMatch, TransportDirection, ETHERTYPE_IPV4, OFP_MATCH_LEN};
pub use flow_mod::{
    FlowMod, FlowModCommand, BUFFER_ID_NONE, OFPT_FLOW_MOD, OFP_FLOW_MOD_MIN_LEN, OFP_HEADER_LEN,
    OFP_VERSION,
};
