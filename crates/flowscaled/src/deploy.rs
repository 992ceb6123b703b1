//! Rule deployment onto switches.

use flowscale_openflow::FlowMod;
use flowscale_types::DatapathId;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

use crate::error::{FlowscaleError, Result};
use crate::group::Group;
use crate::switch::{SwitchHandle, SwitchRegistry};

/// How many flow-mods go out before flushing and pausing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Zero disables batching.
    pub max_flows_per_batch: usize,
    pub pause: Duration,
}

impl BatchPolicy {
    pub const fn new(max_flows_per_batch: usize, pause: Duration) -> Self {
        Self {
            max_flows_per_batch,
            pause,
        }
    }

    /// One flush at the end, no pauses.
    pub const fn unbatched() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(5))
    }
}

/// Outcome of one pass over a switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployStats {
    pub written: usize,
    pub failed: usize,
    /// Batch boundaries reached, each one a flush and a pause.
    pub pauses: usize,
}

/// Writes flow-mods to one switch under a [`BatchPolicy`].
///
/// Write and flush failures are logged and counted, never returned.
pub struct FlowWriter {
    switch: Arc<dyn SwitchHandle>,
    policy: BatchPolicy,
    in_batch: usize,
    stats: DeployStats,
}

impl FlowWriter {
    pub fn new(switch: Arc<dyn SwitchHandle>, policy: BatchPolicy) -> Self {
        Self {
            switch,
            policy,
            in_batch: 0,
            stats: DeployStats::default(),
        }
    }

    pub async fn write(&mut self, flow_mod: &FlowMod) {
        match self.switch.write(flow_mod).await {
            Ok(()) => self.stats.written += 1,
            Err(source) => {
                self.stats.failed += 1;
                let err = self.transport_error(source);
                error!(%flow_mod, error = %err, "Failed to write flow-mod");
            }
        }

        self.in_batch += 1;
        if self.policy.max_flows_per_batch > 0 && self.in_batch >= self.policy.max_flows_per_batch
        {
            self.in_batch = 0;
            self.stats.pauses += 1;
            self.flush().await;
            debug!(
                dpid = %self.switch.id(),
                pause_ms = self.policy.pause.as_millis() as u64,
                "Batch written, pausing"
            );
            tokio::time::sleep(self.policy.pause).await;
        }
    }

    async fn flush(&self) {
        if let Err(source) = self.switch.flush().await {
            let err = self.transport_error(source);
            error!(error = %err, "Failed to flush switch");
        }
    }

    fn transport_error(&self, source: io::Error) -> FlowscaleError {
        FlowscaleError::Transport {
            dpid: self.switch.id(),
            source,
        }
    }

    /// Flushes whatever is left and returns the totals.
    pub async fn finish(self) -> DeployStats {
        self.flush().await;
        self.stats
    }
}

/// Pushes group rules to their output switch and removes them again.
pub struct RuleDeployer {
    registry: Arc<dyn SwitchRegistry>,
    policy: BatchPolicy,
}

impl RuleDeployer {
    pub fn new(registry: Arc<dyn SwitchRegistry>, policy: BatchPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &Arc<dyn SwitchRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> BatchPolicy {
        self.policy
    }

    pub(crate) fn switch(&self, dpid: DatapathId) -> Result<Arc<dyn SwitchHandle>> {
        self.registry
            .lookup(dpid)
            .ok_or(FlowscaleError::SwitchNotConnected(dpid))
    }

    pub(crate) fn writer(&self, dpid: DatapathId) -> Result<FlowWriter> {
        Ok(FlowWriter::new(self.switch(dpid)?, self.policy))
    }

    /// Installs every rule of `group`, generating them first if there are
    /// none. A generation failure aborts the push before anything is
    /// written.
    #[instrument(skip_all, fields(group_id = group.id()))]
    pub async fn push(&self, group: &mut Group) -> Result<DeployStats> {
        if group.rules().is_empty() {
            group.generate(self.registry.as_ref())?;
        }

        let dpid = group.output_switch();
        let mut writer = self.writer(dpid)?;
        let mirrors = self.registry.mirror_ports(dpid);
        group.refresh_mirrors(mirrors.as_ref());

        for rule in group.rules() {
            writer.write(&rule.to_flow_mod()).await;
        }
        let stats = writer.finish().await;

        info!(
            dpid = %dpid,
            written = stats.written,
            failed = stats.failed,
            "Group rules pushed"
        );
        Ok(stats)
    }

    /// Deletes every rule of `group` from its output switch. The rule list
    /// itself is left for the caller to clear.
    #[instrument(skip_all, fields(group_id = group.id()))]
    pub async fn remove(&self, group: &Group) -> Result<DeployStats> {
        let dpid = group.output_switch();
        let mut writer = FlowWriter::new(self.switch(dpid)?, BatchPolicy::unbatched());

        for rule in group.rules() {
            writer.write(&rule.to_delete()).await;
        }
        let stats = writer.finish().await;

        info!(
            dpid = %dpid,
            deleted = stats.written,
            failed = stats.failed,
            "Group rules removed"
        );
        Ok(stats)
    }
}
