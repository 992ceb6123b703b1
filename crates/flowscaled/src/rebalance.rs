//! Rule repair on output port state changes.
//!
//! Repair runs in two phases. `plan_port_up` and `plan_port_down` compute
//! which rules move where from a snapshot of the group, then
//! [`PortEventHandler`] commits the plan and writes one flow-mod per moved
//! rule. Paired network prefix rules always move together.

use flowscale_types::PortNo;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::deploy::{DeployStats, RuleDeployer};
use crate::error::Result;
use crate::group::{Group, Rule};

/// Move rule `rule` (an index into the group's rule list) to `port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reassignment {
    pub rule: usize,
    pub port: PortNo,
}

/// Result of planning a port-down repair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownPlan {
    pub reassignments: Vec<Reassignment>,
    /// Rules left on the failed port because no other port is up.
    pub stranded: Vec<usize>,
}

/// Plans the moves after `port` came up. `live_ports` already contains it.
///
/// Every `k`-th rule moves to the new port, with `k` the number of live
/// ports. Rules moved as the sibling of an earlier rule do not count.
pub fn plan_port_up(rules: &[Rule], live_ports: &[PortNo], port: PortNo) -> Vec<Reassignment> {
    let k = live_ports.len();
    let mut plan = Vec::new();
    if k == 0 {
        return plan;
    }

    let mut checked = vec![false; rules.len()];
    let mut i = 1usize;
    for (index, rule) in rules.iter().enumerate() {
        if checked[index] {
            continue;
        }
        if i % k == 0 {
            checked[index] = true;
            plan.push(Reassignment { rule: index, port });
            if let Some(sibling) = rule.pair.filter(|s| *s < rules.len() && !checked[*s]) {
                checked[sibling] = true;
                plan.push(Reassignment {
                    rule: sibling,
                    port,
                });
            }
        }
        i += 1;
    }
    plan
}

/// Plans the moves after `port` went down. `live_ports` no longer contains
/// it. Rules on the failed port are spread round-robin from `cursor`, which
/// advances once per moved rule or pair.
pub fn plan_port_down(
    rules: &[Rule],
    live_ports: &[PortNo],
    port: PortNo,
    cursor: &mut usize,
) -> DownPlan {
    let mut plan = DownPlan::default();
    let mut checked = vec![false; rules.len()];

    for (index, rule) in rules.iter().enumerate() {
        if checked[index] || rule.primary_port() != Some(port) {
            continue;
        }
        checked[index] = true;
        let sibling = rule.pair.filter(|s| *s < rules.len() && !checked[*s]);
        if let Some(sibling) = sibling {
            checked[sibling] = true;
        }

        if live_ports.is_empty() {
            plan.stranded.push(index);
            plan.stranded.extend(sibling);
            continue;
        }

        let target = live_ports[*cursor % live_ports.len()];
        *cursor = cursor.wrapping_add(1);
        plan.reassignments.push(Reassignment {
            rule: index,
            port: target,
        });
        if let Some(sibling) = sibling {
            plan.reassignments.push(Reassignment {
                rule: sibling,
                port: target,
            });
        }
    }
    plan
}

/// Applies port state changes to groups.
pub struct PortEventHandler {
    deployer: Arc<RuleDeployer>,
}

impl PortEventHandler {
    pub fn new(deployer: Arc<RuleDeployer>) -> Self {
        Self { deployer }
    }

    /// Port `port` of the group's output switch came up.
    ///
    /// A group with no rules yet gets a full push instead of a repair.
    #[instrument(skip_all, fields(group_id = group.id(), port = %port))]
    pub async fn on_port_up(&self, group: &mut Group, port: PortNo) -> Result<DeployStats> {
        if group.is_drop() || !group.mark_port_up(port) {
            debug!("Port event ignored");
            return Ok(DeployStats::default());
        }
        if group.rules().is_empty() {
            return self.deployer.push(group).await;
        }

        let plan = plan_port_up(group.rules(), group.live_ports(), port);
        self.apply(group, &plan).await
    }

    /// Port `port` of the group's output switch went down.
    #[instrument(skip_all, fields(group_id = group.id(), port = %port))]
    pub async fn on_port_down(&self, group: &mut Group, port: PortNo) -> Result<DeployStats> {
        if group.is_drop() || !group.mark_port_down(port) {
            debug!("Port event ignored");
            return Ok(DeployStats::default());
        }

        let mut cursor = group.down_cursor();
        let plan = plan_port_down(group.rules(), group.live_ports(), port, &mut cursor);
        group.set_down_cursor(cursor);

        if !plan.stranded.is_empty() {
            warn!(
                stranded = plan.stranded.len(),
                "No output ports are up, rules left on the failed port"
            );
        }
        self.apply(group, &plan.reassignments).await
    }

    /// Commits `plan` to the group, then writes every moved rule. The
    /// group is updated even when the switch cannot be reached.
    pub async fn apply(&self, group: &mut Group, plan: &[Reassignment]) -> Result<DeployStats> {
        if plan.is_empty() {
            return Ok(DeployStats::default());
        }

        let dpid = group.output_switch();
        let mirrors = self.deployer.registry().mirror_ports(dpid);
        group.apply(plan, mirrors.as_ref());

        let mut writer = self.deployer.writer(dpid)?;
        for reassignment in plan {
            if let Some(rule) = group.rules().get(reassignment.rule) {
                writer.write(&rule.to_flow_mod()).await;
            }
        }
        let stats = writer.finish().await;

        info!(
            dpid = %dpid,
            moved = plan.len(),
            failed = stats.failed,
            "Rules rebalanced"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::BatchPolicy;
    use crate::group::{GroupSpec, RuleOutput};
    use crate::switch::{RecordingSwitch, SwitchEvent, SwitchTable};
    use flowscale_openflow::FlowMatch;
    use flowscale_types::{DatapathId, PortStatus};
    use pretty_assertions::assert_eq;

    fn p(n: u16) -> PortNo {
        PortNo::new(n)
    }

    /// Source/destination pairs on the given ports.
    fn paired_rules(ports: &[u16]) -> Vec<Rule> {
        let mut rules = Vec::new();
        for (n, port) in ports.iter().enumerate() {
            let prefix = format!("10.{}.0.0/16", n).parse().unwrap();
            let index = rules.len();
            let output = RuleOutput::Port(p(*port));
            rules.push(Rule::new(FlowMatch::network_source(prefix), 200, output).paired_with(index + 1));
            rules.push(Rule::new(FlowMatch::network_destination(prefix), 200, output).paired_with(index));
        }
        rules
    }

    fn single_rules(ports: &[u16]) -> Vec<Rule> {
        ports
            .iter()
            .enumerate()
            .map(|(n, port)| {
                Rule::new(
                    FlowMatch::ether_type(0x0800 + n as u16),
                    200,
                    RuleOutput::Port(p(*port)),
                )
            })
            .collect()
    }

    fn moves(plan: &[Reassignment]) -> Vec<(usize, u16)> {
        plan.iter().map(|r| (r.rule, r.port.as_u16())).collect()
    }

    #[test]
    fn test_port_up_moves_every_kth_rule_with_sibling() {
        let rules = paired_rules(&[1, 2, 1, 2]);
        let plan = plan_port_up(&rules, &[p(1), p(2), p(3)], p(3));
        assert_eq!(moves(&plan), vec![(2, 3), (3, 3), (6, 3), (7, 3)]);
    }

    #[test]
    fn test_port_up_unpaired() {
        let rules = single_rules(&[1, 1, 1, 1, 1]);
        let plan = plan_port_up(&rules, &[p(1), p(2)], p(2));
        assert_eq!(moves(&plan), vec![(1, 2), (3, 2)]);
    }

    #[test]
    fn test_port_up_single_live_port_takes_everything() {
        let rules = paired_rules(&[1, 1]);
        let plan = plan_port_up(&rules, &[p(4)], p(4));
        assert_eq!(moves(&plan), vec![(0, 4), (1, 4), (2, 4), (3, 4)]);
    }

    #[test]
    fn test_port_down_round_robin_over_remaining() {
        let rules = paired_rules(&[1, 2, 3, 1, 2, 3]);
        let mut cursor = 0;
        let plan = plan_port_down(&rules, &[p(1), p(3)], p(2), &mut cursor);
        assert_eq!(moves(&plan.reassignments), vec![(2, 1), (3, 1), (8, 3), (9, 3)]);
        assert!(plan.stranded.is_empty());
        assert_eq!(cursor, 2);
    }

    #[test]
    fn test_port_down_continues_from_cursor() {
        let rules = single_rules(&[2, 1, 2]);
        let mut cursor = 5;
        let plan = plan_port_down(&rules, &[p(1), p(3)], p(2), &mut cursor);
        assert_eq!(moves(&plan.reassignments), vec![(0, 3), (2, 1)]);
        assert_eq!(cursor, 7);
    }

    #[test]
    fn test_port_down_without_live_ports_strands_rules() {
        let rules = paired_rules(&[2, 2]);
        let mut cursor = 0;
        let plan = plan_port_down(&rules, &[], p(2), &mut cursor);
        assert!(plan.reassignments.is_empty());
        assert_eq!(plan.stranded, vec![0, 1, 2, 3]);
        assert_eq!(cursor, 0);
    }

    #[test]
    fn test_drop_rules_never_move() {
        let rules = vec![Rule::new(FlowMatch::ether_type(0x0800), 1, RuleOutput::Drop)];
        let mut cursor = 0;
        let plan = plan_port_down(&rules, &[p(1)], p(2), &mut cursor);
        assert_eq!(plan, DownPlan::default());
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_repair() {
        let dpid = DatapathId::new(0xb);
        let table = Arc::new(SwitchTable::new(100));
        let switch = Arc::new(RecordingSwitch::new(
            dpid,
            vec![PortStatus::up(1), PortStatus::up(2), PortStatus::up(3)],
        ));
        table.connect(switch.clone());
        let deployer = Arc::new(RuleDeployer::new(table.clone(), BatchPolicy::unbatched()));
        let handler = PortEventHandler::new(deployer.clone());

        let spec = GroupSpec {
            id: "9".to_string(),
            input_switch: "1".to_string(),
            output_switch: "b".to_string(),
            output_ports: "1,2,3".to_string(),
            kind: "3".to_string(),
            priority: "300".to_string(),
            values: "0800,0806,86dd,88cc,8100,88a8".to_string(),
            max_flows: "12".to_string(),
            ..Default::default()
        };
        let mut group = Group::configure(&spec, table.as_ref()).unwrap();
        deployer.push(&mut group).await.unwrap();
        switch.clear();
        switch.fail_next_writes(1);

        let stats = handler.on_port_down(&mut group, p(2)).await.unwrap();
        assert_eq!(stats, DeployStats { written: 1, failed: 1, pauses: 0 });

        let ports: Vec<_> = group.rules().iter().filter_map(Rule::primary_port).collect();
        assert_eq!(ports, vec![p(1), p(1), p(3), p(1), p(3), p(3)]);

        let events = switch.events();
        assert_eq!(events.len(), 2);
        match &events[0] {
            SwitchEvent::Write(flow_mod) => {
                assert_eq!(flow_mod.flow_match, FlowMatch::ether_type(0x8100));
                assert_eq!(flow_mod.actions[0].port, p(3));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(events[1], SwitchEvent::Flush);
    }
}
