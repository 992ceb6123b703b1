//! Output action.

use bytes::BufMut;
use flowscale_types::PortNo;

/// Size of `ofp_action_output` on the wire.
pub const OFP_ACTION_OUTPUT_LEN: u16 = 8;

const OFPAT_OUTPUT: u16 = 0;

/// Forward the packet out of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionOutput {
    pub port: PortNo,
    /// Bytes to send when the port is the controller; unused otherwise.
    pub max_len: u16,
}

impl ActionOutput {
    pub const fn new(port: PortNo) -> Self {
        Self { port, max_len: 0 }
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u16(OFPAT_OUTPUT);
        dst.put_u16(OFP_ACTION_OUTPUT_LEN);
        dst.put_u16(self.port.as_u16());
        dst.put_u16(self.max_len);
    }
}
