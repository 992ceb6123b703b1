//! Switch-facing seams.
//!
//! The engine never owns a switch connection. It reaches switches through
//! [`SwitchRegistry`], which also owns the shared per-switch state (the
//! automatic priority counter and the mirror-port table).

mod recording;
mod stream;
mod table;

pub use recording::{RecordingSwitch, SwitchEvent};
pub use stream::StreamSwitch;
pub use table::SwitchTable;

use async_trait::async_trait;
use flowscale_openflow::FlowMod;
use flowscale_types::{DatapathId, PortNo, PortStatus};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

/// Primary output port to mirror port, per switch.
pub type MirrorMap = HashMap<PortNo, PortNo>;

/// A connected switch control channel.
///
/// Writes to one handle must reach the switch in submission order.
#[async_trait]
pub trait SwitchHandle: Send + Sync {
    /// Returns the switch identifier.
    fn id(&self) -> DatapathId;

    /// Queues one flow-mod for the switch.
    async fn write(&self, flow_mod: &FlowMod) -> io::Result<()>;

    /// Pushes everything queued so far onto the channel.
    async fn flush(&self) -> io::Result<()>;

    /// Returns the last known state of every switch port.
    fn port_states(&self) -> Vec<PortStatus>;
}

/// Lookup of connected switches and the state shared across groups.
pub trait SwitchRegistry: Send + Sync {
    /// Returns the handle of a connected switch.
    fn lookup(&self, dpid: DatapathId) -> Option<Arc<dyn SwitchHandle>>;

    /// Increments and returns the automatic priority of a switch.
    fn next_priority(&self, dpid: DatapathId) -> u16;

    /// Returns the mirror table of a switch, if it has one.
    fn mirror_ports(&self, dpid: DatapathId) -> Option<MirrorMap>;
}
