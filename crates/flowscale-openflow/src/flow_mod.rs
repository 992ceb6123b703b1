//! `ofp_flow_mod` messages.

use bytes::BufMut;
use flowscale_types::PortNo;
use std::fmt;

use crate::action::{ActionOutput, OFP_ACTION_OUTPUT_LEN};
use crate::flow_match::FlowMatch;

pub const OFP_VERSION: u8 = 0x01;
pub const OFPT_FLOW_MOD: u8 = 14;
pub const OFP_HEADER_LEN: u16 = 8;

/// Size of a flow-mod without actions.
pub const OFP_FLOW_MOD_MIN_LEN: u16 = 72;

/// "No buffered packet" buffer id (-1).
pub const BUFFER_ID_NONE: u32 = 0xffff_ffff;

/// `ofp_flow_mod_command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FlowModCommand {
    Add = 0,
    Delete = 3,
    DeleteStrict = 4,
}

impl fmt::Display for FlowModCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::DeleteStrict => "delete_strict",
        };
        write!(f, "{}", s)
    }
}

/// A flow table modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMod {
    pub command: FlowModCommand,
    pub flow_match: FlowMatch,
    pub cookie: u64,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub priority: u16,
    pub buffer_id: u32,
    pub out_port: PortNo,
    pub flags: u16,
    pub actions: Vec<ActionOutput>,
}

impl FlowMod {
    /// A permanent flow insertion. An existing flow with the same match and
    /// priority is replaced by the switch.
    pub fn add(flow_match: FlowMatch, priority: u16, actions: Vec<ActionOutput>) -> Self {
        Self {
            command: FlowModCommand::Add,
            flow_match,
            cookie: 0,
            idle_timeout: 0,
            hard_timeout: 0,
            priority,
            buffer_id: BUFFER_ID_NONE,
            out_port: PortNo::NONE,
            flags: 0,
            actions,
        }
    }

    /// Deletes exactly the flow with this match and priority, whatever its
    /// output port.
    pub fn delete_strict(flow_match: FlowMatch, priority: u16) -> Self {
        Self {
            command: FlowModCommand::DeleteStrict,
            ..Self::add(flow_match, priority, Vec::new())
        }
    }

    /// Returns true when the flow drops matching packets.
    pub fn is_drop(&self) -> bool {
        self.actions.is_empty()
    }

    /// Total message length: the fixed part plus one output action each.
    pub fn length(&self) -> u16 {
        OFP_FLOW_MOD_MIN_LEN + OFP_ACTION_OUTPUT_LEN * self.actions.len() as u16
    }

    /// Writes the complete message, header included.
    pub fn encode<B: BufMut>(&self, xid: u32, dst: &mut B) {
        dst.put_u8(OFP_VERSION);
        dst.put_u8(OFPT_FLOW_MOD);
        dst.put_u16(self.length());
        dst.put_u32(xid);

        self.flow_match.encode(dst);

        dst.put_u64(self.cookie);
        dst.put_u16(self.command as u16);
        dst.put_u16(self.idle_timeout);
        dst.put_u16(self.hard_timeout);
        dst.put_u16(self.priority);
        dst.put_u32(self.buffer_id);
        dst.put_u16(self.out_port.as_u16());
        dst.put_u16(self.flags);

        for action in &self.actions {
            action.encode(dst);
        }
    }
}

impl fmt::Display for FlowMod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "flow_mod({} priority={} match=[{}] actions=",
            self.command, self.priority, self.flow_match
        )?;
        if self.actions.is_empty() {
            write!(f, "drop)")
        } else {
            let ports: Vec<String> = self.actions.iter().map(|a| a.port.to_string()).collect();
            write!(f, "output:{})", ports.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow_match::OFP_MATCH_LEN;
    use pretty_assertions::assert_eq;

    fn sample_match() -> FlowMatch {
        FlowMatch::network_source("10.0.0.0/19".parse().unwrap())
    }

    #[test]
    fn test_add_defaults() {
        let fm = FlowMod::add(sample_match(), 200, vec![ActionOutput::new(PortNo::new(3))]);
        assert_eq!(fm.command, FlowModCommand::Add);
        assert_eq!(fm.idle_timeout, 0);
        assert_eq!(fm.hard_timeout, 0);
        assert_eq!(fm.buffer_id, BUFFER_ID_NONE);
        assert_eq!(fm.length(), 80);
    }

    #[test]
    fn test_length_counts_every_output() {
        let one = FlowMod::add(sample_match(), 1, vec![ActionOutput::new(PortNo::new(1))]);
        let mirrored = FlowMod::add(
            sample_match(),
            1,
            vec![ActionOutput::new(PortNo::new(1)), ActionOutput::new(PortNo::new(9))],
        );
        let drop = FlowMod::add(sample_match(), 1, Vec::new());

        assert_eq!(one.length(), OFP_FLOW_MOD_MIN_LEN + OFP_ACTION_OUTPUT_LEN);
        assert_eq!(mirrored.length(), OFP_FLOW_MOD_MIN_LEN + 2 * OFP_ACTION_OUTPUT_LEN);
        assert_eq!(drop.length(), OFP_FLOW_MOD_MIN_LEN);
        assert!(drop.is_drop());
    }

    #[test]
    fn test_delete_strict() {
        let fm = FlowMod::delete_strict(sample_match(), 7);
        assert_eq!(fm.command, FlowModCommand::DeleteStrict);
        assert_eq!(fm.out_port, PortNo::NONE);
        assert_eq!(fm.priority, 7);
        assert!(fm.actions.is_empty());
        assert_eq!(fm.length(), OFP_FLOW_MOD_MIN_LEN);
    }

    #[test]
    fn test_encode_wire_bytes() {
        let fm = FlowMod::add(sample_match(), 0x1234, vec![ActionOutput::new(PortNo::new(5))]);
        let mut buf = Vec::new();
        fm.encode(0xdead_beef, &mut buf);

        assert_eq!(buf.len(), fm.length() as usize);
        assert_eq!(&buf[0..8], &[0x01, 14, 0, 80, 0xde, 0xad, 0xbe, 0xef]);

        let body = 8 + OFP_MATCH_LEN;
        assert_eq!(&buf[body..body + 8], &[0; 8]); // cookie
        assert_eq!(&buf[body + 8..body + 10], &[0, 0]); // command add
        assert_eq!(&buf[body + 10..body + 14], &[0, 0, 0, 0]); // timeouts
        assert_eq!(&buf[body + 14..body + 16], &[0x12, 0x34]);
        assert_eq!(&buf[body + 16..body + 20], &[0xff, 0xff, 0xff, 0xff]);
        assert_eq!(&buf[body + 20..body + 22], &[0xff, 0xff]); // out_port none
        assert_eq!(&buf[72..80], &[0, 0, 0, 8, 0, 5, 0, 0]);
    }

    #[test]
    fn test_encode_drop_has_no_action_section() {
        let fm = FlowMod::add(sample_match(), 1, Vec::new());
        let mut buf = Vec::new();
        fm.encode(1, &mut buf);
        assert_eq!(buf.len(), OFP_FLOW_MOD_MIN_LEN as usize);
        assert_eq!(&buf[2..4], &[0, 72]);
    }

    #[test]
    fn test_display() {
        let fm = FlowMod::add(sample_match(), 3, vec![ActionOutput::new(PortNo::new(2))]);
        assert_eq!(
            fm.to_string(),
            "flow_mod(add priority=3 match=[dl_type=0x0800,nw_src=10.0.0.0/19] actions=output:2)"
        );
    }
}
