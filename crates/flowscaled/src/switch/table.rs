//! In-memory switch registry.

use dashmap::DashMap;
use flowscale_types::{DatapathId, PortNo};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{MirrorMap, SwitchHandle, SwitchRegistry};

struct SwitchEntry {
    handle: Option<Arc<dyn SwitchHandle>>,
    priority: AtomicU16,
    mirrors: MirrorMap,
}

impl SwitchEntry {
    fn new(initial_priority: u16) -> Self {
        Self {
            handle: None,
            priority: AtomicU16::new(initial_priority),
            mirrors: MirrorMap::new(),
        }
    }
}

/// Concurrent [`SwitchRegistry`] keyed by datapath id.
///
/// Entries outlive disconnects so a reconnecting switch keeps its priority
/// counter and mirror table.
pub struct SwitchTable {
    switches: DashMap<DatapathId, SwitchEntry>,
    initial_priority: u16,
}

impl SwitchTable {
    pub fn new(initial_priority: u16) -> Self {
        Self {
            switches: DashMap::new(),
            initial_priority,
        }
    }

    /// Registers a connected switch, replacing any previous handle.
    pub fn connect(&self, handle: Arc<dyn SwitchHandle>) {
        let dpid = handle.id();
        self.switches
            .entry(dpid)
            .or_insert_with(|| SwitchEntry::new(self.initial_priority))
            .handle = Some(handle);
        info!(dpid = %dpid, "Switch connected");
    }

    /// Forgets the handle of a switch. Returns false if it was not connected.
    pub fn disconnect(&self, dpid: DatapathId) -> bool {
        let removed = self
            .switches
            .get_mut(&dpid)
            .and_then(|mut entry| entry.handle.take())
            .is_some();
        if removed {
            info!(dpid = %dpid, "Switch disconnected");
        }
        removed
    }

    /// Mirrors traffic sent to `port` onto `mirror` as well.
    pub fn set_mirror_port(&self, dpid: DatapathId, port: PortNo, mirror: PortNo) {
        self.switches
            .entry(dpid)
            .or_insert_with(|| SwitchEntry::new(self.initial_priority))
            .mirrors
            .insert(port, mirror);
        debug!(dpid = %dpid, port = %port, mirror = %mirror, "Mirror port set");
    }

    /// Returns the removed mirror port, if any.
    pub fn clear_mirror_port(&self, dpid: DatapathId, port: PortNo) -> Option<PortNo> {
        self.switches
            .get_mut(&dpid)
            .and_then(|mut entry| entry.mirrors.remove(&port))
    }
}

impl Default for SwitchTable {
    fn default() -> Self {
        Self::new(crate::group::AUTO_PRIORITY)
    }
}

impl SwitchRegistry for SwitchTable {
    fn lookup(&self, dpid: DatapathId) -> Option<Arc<dyn SwitchHandle>> {
        self.switches
            .get(&dpid)
            .and_then(|entry| entry.handle.clone())
    }

    fn next_priority(&self, dpid: DatapathId) -> u16 {
        let entry = self
            .switches
            .entry(dpid)
            .or_insert_with(|| SwitchEntry::new(self.initial_priority));
        let previous = entry
            .priority
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| {
                Some(p.saturating_add(1))
            })
            .unwrap_or_else(|p| p);
        if previous == u16::MAX {
            warn!(dpid = %dpid, "Automatic priority exhausted, reusing {}", u16::MAX);
        }
        previous.saturating_add(1)
    }

    fn mirror_ports(&self, dpid: DatapathId) -> Option<MirrorMap> {
        self.switches
            .get(&dpid)
            .filter(|entry| !entry.mirrors.is_empty())
            .map(|entry| entry.mirrors.clone())
    }
}
