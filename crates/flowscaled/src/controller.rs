//! Host-facing entry points.
//!
//! The host framework reports switch and port events here. Each group sits
//! behind its own mutex so events for different groups run concurrently
//! while one group's generation, push and repair never interleave.

use flowscale_types::{DatapathId, LinkState, PortNo};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::deploy::{BatchPolicy, DeployStats, RuleDeployer};
use crate::error::{FlowscaleError, Result};
use crate::group::{Group, GroupEdit, GroupSpec};
use crate::rebalance::PortEventHandler;
use crate::switch::SwitchRegistry;

type SharedGroup = Arc<Mutex<Group>>;

struct GroupEntry {
    /// Output switch, fixed for the life of a group.
    output_switch: DatapathId,
    group: SharedGroup,
}

/// Owns every configured group and routes events to them.
pub struct FlowscaleController {
    registry: Arc<dyn SwitchRegistry>,
    deployer: Arc<RuleDeployer>,
    port_events: PortEventHandler,
    groups: RwLock<BTreeMap<u32, GroupEntry>>,
}

impl FlowscaleController {
    pub fn new(registry: Arc<dyn SwitchRegistry>, policy: BatchPolicy) -> Self {
        let deployer = Arc::new(RuleDeployer::new(registry.clone(), policy));
        Self {
            registry,
            port_events: PortEventHandler::new(deployer.clone()),
            deployer,
            groups: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn deployer(&self) -> &Arc<RuleDeployer> {
        &self.deployer
    }

    /// Configures a group from its text form and, if its output switch is
    /// connected, pushes its rules. Push failures are logged.
    pub async fn add_group(&self, spec: &GroupSpec) -> Result<u32> {
        let group = Group::configure(spec, self.registry.as_ref())?;
        self.insert_group(group).await
    }

    pub async fn insert_group(&self, group: Group) -> Result<u32> {
        let id = group.id();
        let dpid = group.output_switch();

        let mut groups = self.groups.write().await;
        if groups.contains_key(&id) {
            return Err(FlowscaleError::GroupExists(id));
        }
        let shared = Arc::new(Mutex::new(group));
        let mut group = shared.clone().lock_owned().await;
        groups.insert(
            id,
            GroupEntry {
                output_switch: dpid,
                group: shared,
            },
        );
        drop(groups);

        info!(group_id = id, "Group added");
        if self.registry.lookup(dpid).is_some() {
            if let Err(e) = self.deployer.push(&mut group).await {
                error!(group_id = id, error = %e, "Failed to push new group");
            }
        }
        Ok(id)
    }

    /// Deletes a group's rules from its switch and forgets the group.
    pub async fn remove_group(&self, id: u32) -> Result<()> {
        let shared = self
            .groups
            .write()
            .await
            .remove(&id)
            .map(|entry| entry.group)
            .ok_or(FlowscaleError::GroupNotFound(id))?;

        let mut group = shared.lock().await;
        if !group.rules().is_empty() {
            if let Err(e) = self.deployer.remove(&group).await {
                warn!(group_id = id, error = %e, "Failed to delete group rules");
            }
        }
        group.clear_rules();
        info!(group_id = id, "Group removed");
        Ok(())
    }

    /// Applies one edit to a running group.
    ///
    /// Port edits change the candidate output ports and repair the rules in
    /// place. Value edits replace the deployed rules entirely.
    pub async fn edit_group(&self, id: u32, edit: GroupEdit) -> Result<DeployStats> {
        let shared = self.group(id).await.ok_or(FlowscaleError::GroupNotFound(id))?;
        let mut group = shared.lock().await;
        info!(group_id = id, %edit, "Editing group");

        match edit {
            GroupEdit::AddPort(port) => {
                if !group.add_output_port(port)? || !self.port_is_up(group.output_switch(), port) {
                    return Ok(DeployStats::default());
                }
                self.port_events.on_port_up(&mut group, port).await
            }
            GroupEdit::RemovePort(port) => {
                if !group.remove_output_port(port)? {
                    return Ok(DeployStats::default());
                }
                self.port_events.on_port_down(&mut group, port).await
            }
            GroupEdit::AddValue(value) => {
                if !group.add_value(&value)? {
                    return Ok(DeployStats::default());
                }
                self.redeploy(&mut group).await
            }
            GroupEdit::RemoveValue(value) => {
                if !group.remove_value(&value)? {
                    return Ok(DeployStats::default());
                }
                self.redeploy(&mut group).await
            }
        }
    }

    async fn redeploy(&self, group: &mut Group) -> Result<DeployStats> {
        if !group.rules().is_empty() {
            if let Err(e) = self.deployer.remove(group).await {
                warn!(group_id = group.id(), error = %e, "Failed to delete old rules");
            }
        }
        group.clear_rules();
        self.deployer.push(group).await
    }

    fn port_is_up(&self, dpid: DatapathId, port: PortNo) -> bool {
        self.registry.lookup(dpid).is_some_and(|switch| {
            switch
                .port_states()
                .iter()
                .any(|status| status.port == port && status.state.is_up())
        })
    }

    pub async fn group_ids(&self) -> Vec<u32> {
        self.groups.read().await.keys().copied().collect()
    }

    pub async fn group(&self, id: u32) -> Option<SharedGroup> {
        self.groups
            .read()
            .await
            .get(&id)
            .map(|entry| entry.group.clone())
    }

    /// Runs `f` on a group while holding its lock.
    pub async fn with_group<R>(&self, id: u32, f: impl FnOnce(&Group) -> R) -> Option<R> {
        let shared = self.group(id).await?;
        let group = shared.lock().await;
        Some(f(&group))
    }

    async fn groups_on(&self, dpid: DatapathId) -> Vec<SharedGroup> {
        self.groups
            .read()
            .await
            .values()
            .filter(|entry| entry.output_switch == dpid)
            .map(|entry| entry.group.clone())
            .collect()
    }

    /// The switch connected: rebuild each of its groups against the current
    /// port states and push.
    pub async fn on_switch_up(&self, dpid: DatapathId) {
        let Some(switch) = self.registry.lookup(dpid) else {
            warn!(dpid = %dpid, "Switch up reported for unknown switch");
            return;
        };
        let states = switch.port_states();

        for shared in self.groups_on(dpid).await {
            let mut group = shared.lock().await;
            group.refresh_live_ports(&states);
            group.clear_rules();
            match self.deployer.push(&mut group).await {
                Ok(stats) => debug!(group_id = group.id(), written = stats.written, "Group deployed"),
                Err(e) => error!(group_id = group.id(), error = %e, "Failed to deploy group"),
            }
        }
    }

    /// The switch went away together with its flow table.
    pub async fn on_switch_down(&self, dpid: DatapathId) {
        for shared in self.groups_on(dpid).await {
            let mut group = shared.lock().await;
            group.clear_rules();
            info!(group_id = group.id(), dpid = %dpid, "Group rules cleared, switch down");
        }
    }

    pub async fn on_port_changed(&self, dpid: DatapathId, port: PortNo, state: LinkState) {
        debug!(dpid = %dpid, port = %port, %state, "Port changed");
        for shared in self.groups_on(dpid).await {
            let mut group = shared.lock().await;
            if !group.is_output_port(port) {
                continue;
            }
            let result = match state {
                LinkState::Up => self.port_events.on_port_up(&mut group, port).await,
                LinkState::Down => self.port_events.on_port_down(&mut group, port).await,
            };
            if let Err(e) = result {
                error!(group_id = group.id(), port = %port, error = %e, "Failed to rebalance group");
            }
        }
    }
}
