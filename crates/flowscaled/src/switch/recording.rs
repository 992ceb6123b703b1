//! A switch handle that keeps everything written to it.

use async_trait::async_trait;
use flowscale_openflow::FlowMod;
use flowscale_types::{DatapathId, PortStatus};
use parking_lot::Mutex;
use std::io;

use super::SwitchHandle;

/// One operation observed by a [`RecordingSwitch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchEvent {
    Write(FlowMod),
    Flush,
}

#[derive(Debug, Default)]
struct Recorder {
    events: Vec<SwitchEvent>,
    failing_writes: usize,
    failing_flushes: usize,
}

/// In-memory [`SwitchHandle`] for dry runs and tests.
///
/// Failed writes and flushes are not recorded.
#[derive(Debug)]
pub struct RecordingSwitch {
    dpid: DatapathId,
    ports: Vec<PortStatus>,
    recorder: Mutex<Recorder>,
}

impl RecordingSwitch {
    pub fn new(dpid: DatapathId, ports: Vec<PortStatus>) -> Self {
        Self {
            dpid,
            ports,
            recorder: Mutex::new(Recorder::default()),
        }
    }

    /// Makes the next `count` writes fail with a broken pipe.
    pub fn fail_next_writes(&self, count: usize) {
        self.recorder.lock().failing_writes = count;
    }

    /// Makes the next `count` flushes fail with a broken pipe.
    pub fn fail_next_flushes(&self, count: usize) {
        self.recorder.lock().failing_flushes = count;
    }

    pub fn events(&self) -> Vec<SwitchEvent> {
        self.recorder.lock().events.clone()
    }

    /// Flow-mods written so far, in order.
    pub fn written(&self) -> Vec<FlowMod> {
        self.recorder
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                SwitchEvent::Write(flow_mod) => Some(flow_mod.clone()),
                SwitchEvent::Flush => None,
            })
            .collect()
    }

    pub fn flush_count(&self) -> usize {
        self.recorder
            .lock()
            .events
            .iter()
            .filter(|event| matches!(event, SwitchEvent::Flush))
            .count()
    }

    pub fn clear(&self) {
        self.recorder.lock().events.clear();
    }
}

#[async_trait]
impl SwitchHandle for RecordingSwitch {
    fn id(&self) -> DatapathId {
        self.dpid
    }

    async fn write(&self, flow_mod: &FlowMod) -> io::Result<()> {
        let mut recorder = self.recorder.lock();
        if recorder.failing_writes > 0 {
            recorder.failing_writes -= 1;
            return Err(channel_closed());
        }
        recorder.events.push(SwitchEvent::Write(flow_mod.clone()));
        Ok(())
    }

    async fn flush(&self) -> io::Result<()> {
        let mut recorder = self.recorder.lock();
        if recorder.failing_flushes > 0 {
            recorder.failing_flushes -= 1;
            return Err(channel_closed());
        }
        recorder.events.push(SwitchEvent::Flush);
        Ok(())
    }

    fn port_states(&self) -> Vec<PortStatus> {
        self.ports.clone()
    }
}

fn channel_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "switch channel closed")
}
