//! A switch handle over an ordered byte stream.

use async_trait::async_trait;
use flowscale_openflow::{FlowMod, FlowModCodec};
use flowscale_types::{DatapathId, PortStatus};
use futures::SinkExt;
use parking_lot::RwLock;
use std::io;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio_util::codec::FramedWrite;
use tracing::trace;

use super::SwitchHandle;

/// Encodes flow-mods onto the write half of a switch control channel.
///
/// Writes are buffered by the framed sink and only guaranteed to be on the
/// wire after [`SwitchHandle::flush`]. The host keeps the port snapshot
/// current with [`StreamSwitch::update_port`].
pub struct StreamSwitch<W> {
    dpid: DatapathId,
    sink: Mutex<FramedWrite<W, FlowModCodec>>,
    ports: RwLock<Vec<PortStatus>>,
}

impl<W: AsyncWrite + Unpin> StreamSwitch<W> {
    pub fn new(dpid: DatapathId, writer: W, ports: Vec<PortStatus>) -> Self {
        Self::with_codec(dpid, writer, FlowModCodec::new(), ports)
    }

    pub fn with_codec(
        dpid: DatapathId,
        writer: W,
        codec: FlowModCodec,
        ports: Vec<PortStatus>,
    ) -> Self {
        Self {
            dpid,
            sink: Mutex::new(FramedWrite::new(writer, codec)),
            ports: RwLock::new(ports),
        }
    }

    /// Records a port-status change. Unknown ports are appended.
    pub fn update_port(&self, status: PortStatus) {
        let mut ports = self.ports.write();
        match ports.iter_mut().find(|p| p.port == status.port) {
            Some(existing) => *existing = status,
            None => ports.push(status),
        }
    }

    /// Consumes the handle and returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.sink.into_inner().into_inner()
    }
}

#[async_trait]
impl<W> SwitchHandle for StreamSwitch<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn id(&self) -> DatapathId {
        self.dpid
    }

    async fn write(&self, flow_mod: &FlowMod) -> io::Result<()> {
        trace!(dpid = %self.dpid, %flow_mod, "Queueing flow-mod");
        self.sink.lock().await.feed(flow_mod.clone()).await
    }

    async fn flush(&self) -> io::Result<()> {
        self.sink.lock().await.flush().await
    }

    fn port_states(&self) -> Vec<PortStatus> {
        self.ports.read().clone()
    }
}
