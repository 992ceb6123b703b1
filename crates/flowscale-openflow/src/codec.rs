//! Flow-mod encoder for a switch control channel.

use bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::flow_mod::FlowMod;

/// Encodes [`FlowMod`]s, stamping each with the next transaction id.
#[derive(Debug, Default)]
pub struct FlowModCodec {
    next_xid: u32,
}

impl FlowModCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts numbering transactions at `xid`.
    pub fn with_initial_xid(xid: u32) -> Self {
        Self { next_xid: xid }
    }

    /// Transaction id the next message will carry.
    pub fn next_xid(&self) -> u32 {
        self.next_xid
    }
}

impl Encoder<FlowMod> for FlowModCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: FlowMod, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.length() as usize);

        let xid = self.next_xid;
        self.next_xid = self.next_xid.wrapping_add(1);
        item.encode(xid, dst);

        Ok(())
    }
}
