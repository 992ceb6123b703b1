//! Group state and rule generation.

use flowscale_openflow::FlowMatch;
use flowscale_types::{DatapathId, PortNo, PortStatus};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use super::rule::{Rule, RuleOutput};
use super::types::{GroupConfig, GroupSpec, MatchKind, MatchSpec, AUTO_PRIORITY};
use crate::error::{FlowscaleError, Result};
use crate::rebalance::Reassignment;
use crate::switch::{MirrorMap, SwitchRegistry};

/// One traffic-steering policy and the rules generated for it.
///
/// A group owns its live-port set and rule list. It is not safe for
/// concurrent mutation; callers serialize access per group.
#[derive(Debug, Clone)]
pub struct Group {
    config: GroupConfig,
    drop: bool,
    live_ports: Vec<PortNo>,
    rules: Vec<Rule>,
    /// Priorities allocated for the automatic priority, by match.
    assigned_priorities: HashMap<FlowMatch, u16>,
    down_cursor: usize,
}

impl Group {
    /// Creates a group with no live ports and no rules. A group without
    /// output ports drops matching traffic.
    pub fn new(config: GroupConfig) -> Self {
        let drop = config.output_ports.is_empty();
        Self {
            config,
            drop,
            live_ports: Vec::new(),
            rules: Vec::new(),
            assigned_priorities: HashMap::new(),
            down_cursor: 0,
        }
    }

    /// Parses `spec` and seeds the live ports from the output switch when it
    /// is connected.
    pub fn configure(spec: &GroupSpec, registry: &dyn SwitchRegistry) -> Result<Self> {
        let config = spec.parse()?;
        let mut group = Self::new(config);
        if let Some(switch) = registry.lookup(group.output_switch()) {
            group.refresh_live_ports(&switch.port_states());
        }
        info!(
            group_id = group.id(),
            name = %group.name(),
            kind = %group.kind(),
            output_switch = %group.output_switch(),
            live_ports = ?group.live_ports,
            drop = group.drop,
            "Group configured"
        );
        Ok(group)
    }

    pub fn id(&self) -> u32 {
        self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    pub fn input_switch(&self) -> DatapathId {
        self.config.input_switch
    }

    pub fn output_switch(&self) -> DatapathId {
        self.config.output_switch
    }

    pub fn input_ports(&self) -> &[PortNo] {
        &self.config.input_ports
    }

    /// Configured output ports, up or not.
    pub fn output_ports(&self) -> &[PortNo] {
        &self.config.output_ports
    }

    pub fn kind(&self) -> MatchKind {
        self.config.match_spec.kind()
    }

    pub fn match_spec(&self) -> &MatchSpec {
        &self.config.match_spec
    }

    pub fn values(&self) -> Vec<String> {
        self.config.match_spec.values()
    }

    pub fn priority(&self) -> u16 {
        self.config.priority
    }

    pub fn max_flows(&self) -> u32 {
        self.config.max_flows
    }

    pub fn is_drop(&self) -> bool {
        self.drop
    }

    /// Output ports currently up, in assignment order.
    pub fn live_ports(&self) -> &[PortNo] {
        &self.live_ports
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn clear_rules(&mut self) {
        self.rules.clear();
    }

    /// Returns true if `port` is one of the configured output ports.
    pub fn is_output_port(&self, port: PortNo) -> bool {
        self.config.output_ports.contains(&port)
    }

    /// Rebuilds the live-port set from a switch port snapshot.
    pub fn refresh_live_ports(&mut self, states: &[PortStatus]) {
        let mut live = Vec::new();
        for status in states {
            if status.state.is_up() && self.is_output_port(status.port) && !live.contains(&status.port)
            {
                live.push(status.port);
            }
        }
        self.live_ports = live;
    }

    /// Adds a configured output port to the live set. Returns false if the
    /// port is not an output of this group or was already live.
    pub fn mark_port_up(&mut self, port: PortNo) -> bool {
        if !self.is_output_port(port) || self.live_ports.contains(&port) {
            return false;
        }
        self.live_ports.push(port);
        true
    }

    /// Returns false if the port was not live.
    pub fn mark_port_down(&mut self, port: PortNo) -> bool {
        let before = self.live_ports.len();
        self.live_ports.retain(|p| *p != port);
        self.live_ports.len() != before
    }

    /// Adds a candidate output port. The port is not live until it is
    /// reported up.
    pub fn add_output_port(&mut self, port: PortNo) -> Result<bool> {
        if self.drop {
            return Err(FlowscaleError::configuration(
                "output_ports",
                format!("group {} drops traffic and has no output ports", self.id()),
            ));
        }
        if !port.is_physical() {
            return Err(FlowscaleError::configuration(
                "output_ports",
                format!("reserved port number: {}", port),
            ));
        }
        if self.is_output_port(port) {
            return Ok(false);
        }
        self.config.output_ports.push(port);
        Ok(true)
    }

    /// Removes a candidate output port, live or not.
    pub fn remove_output_port(&mut self, port: PortNo) -> Result<bool> {
        if self.drop {
            return Err(FlowscaleError::configuration(
                "output_ports",
                format!("group {} drops traffic and has no output ports", self.id()),
            ));
        }
        let before = self.config.output_ports.len();
        self.config.output_ports.retain(|p| *p != port);
        Ok(self.config.output_ports.len() != before)
    }

    pub fn add_value(&mut self, text: &str) -> Result<bool> {
        self.config.match_spec.add_value(text)
    }

    pub fn remove_value(&mut self, text: &str) -> Result<bool> {
        self.config.match_spec.remove_value(text)
    }

    /// Rebuilds the rule list from the configured values.
    ///
    /// One round-robin cursor spans all values. Rules that would need an
    /// output port while none is live are skipped and logged. A prefix whose
    /// flow budget is exhausted aborts generation; rules built for earlier
    /// values are kept.
    pub fn generate(&mut self, registry: &dyn SwitchRegistry) -> Result<()> {
        self.rules.clear();
        let mut cursor = 0usize;

        match self.config.match_spec.clone() {
            MatchSpec::NetworkPrefix(prefixes) => {
                // every sub-prefix yields a source and a destination rule
                let budget = self.config.max_flows / prefixes.len().max(1) as u32 / 2;
                for prefix in prefixes {
                    let parts = prefix.partition(budget).map_err(|source| {
                        warn!(group_id = self.id(), %prefix, budget, "Cannot partition prefix");
                        FlowscaleError::PartitionBudget {
                            group_id: self.id(),
                            source,
                        }
                    })?;

                    let mut skipped = 0usize;
                    for part in parts {
                        let Some(output) = self.next_output(&mut cursor) else {
                            skipped += 1;
                            continue;
                        };
                        let source = FlowMatch::network_source(part);
                        let priority = self.resolve_priority(source, registry);
                        let index = self.rules.len();
                        self.rules
                            .push(Rule::new(source, priority, output).paired_with(index + 1));
                        self.rules.push(
                            Rule::new(FlowMatch::network_destination(part), priority, output)
                                .paired_with(index),
                        );
                    }
                    self.log_skipped(&prefix.to_string(), skipped);
                }
            }
            MatchSpec::TransportPort {
                protocol,
                direction,
                ports,
            } => {
                for port in ports {
                    let flow_match = FlowMatch::transport(protocol, direction, port);
                    self.push_single(flow_match, &port.to_string(), &mut cursor, registry);
                }
            }
            MatchSpec::EtherType(types) => {
                for ether_type in types {
                    let flow_match = FlowMatch::ether_type(ether_type);
                    let value = format!("0x{:04x}", ether_type);
                    self.push_single(flow_match, &value, &mut cursor, registry);
                }
            }
        }

        // forget priorities of matches that no longer exist
        let used: HashSet<FlowMatch> = self.rules.iter().map(|rule| rule.flow_match).collect();
        self.assigned_priorities.retain(|key, _| used.contains(key));

        debug!(
            group_id = self.id(),
            rules = self.rules.len(),
            live_ports = ?self.live_ports,
            "Rules generated"
        );
        Ok(())
    }

    fn push_single(
        &mut self,
        flow_match: FlowMatch,
        value: &str,
        cursor: &mut usize,
        registry: &dyn SwitchRegistry,
    ) {
        match self.next_output(cursor) {
            Some(output) => {
                let priority = self.resolve_priority(flow_match, registry);
                self.rules.push(Rule::new(flow_match, priority, output));
            }
            None => self.log_skipped(value, 1),
        }
    }

    /// Next round-robin output. Drop groups never consume the cursor.
    fn next_output(&self, cursor: &mut usize) -> Option<RuleOutput> {
        if self.drop {
            return Some(RuleOutput::Drop);
        }
        if self.live_ports.is_empty() {
            return None;
        }
        let port = self.live_ports[*cursor % self.live_ports.len()];
        *cursor += 1;
        Some(RuleOutput::Port(port))
    }

    fn resolve_priority(&mut self, key: FlowMatch, registry: &dyn SwitchRegistry) -> u16 {
        if self.config.priority != AUTO_PRIORITY {
            return self.config.priority;
        }
        let dpid = self.config.output_switch;
        *self
            .assigned_priorities
            .entry(key)
            .or_insert_with(|| registry.next_priority(dpid))
    }

    fn log_skipped(&self, value: &str, skipped: usize) {
        if skipped > 0 {
            warn!(
                group_id = self.id(),
                value,
                skipped,
                "No output ports are up, rules not generated"
            );
        }
    }

    /// Commits a reassignment plan to the rule list.
    pub(crate) fn apply(&mut self, plan: &[Reassignment], mirrors: Option<&MirrorMap>) {
        for reassignment in plan {
            if let Some(rule) = self.rules.get_mut(reassignment.rule) {
                rule.assign(reassignment.port, mirrors);
            }
        }
    }

    /// Recomputes every mirror from a fresh mirror table.
    pub(crate) fn refresh_mirrors(&mut self, mirrors: Option<&MirrorMap>) {
        for rule in &mut self.rules {
            rule.refresh_mirror(mirrors);
        }
    }

    /// Cursor for port-down reassignment. It keeps advancing across events.
    pub(crate) fn down_cursor(&self) -> usize {
        self.down_cursor
    }

    pub(crate) fn set_down_cursor(&mut self, cursor: usize) {
        self.down_cursor = cursor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switch::{RecordingSwitch, SwitchTable};
    use flowscale_types::Ipv4Prefix;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const OUTPUT: DatapathId = DatapathId::new(2);

    fn spec(kind: &str, values: &str, output_ports: &str) -> GroupSpec {
        GroupSpec {
            id: "1".to_string(),
            name: "test".to_string(),
            input_switch: "1".to_string(),
            output_switch: "2".to_string(),
            input_ports: String::new(),
            output_ports: output_ports.to_string(),
            kind: kind.to_string(),
            priority: "200".to_string(),
            values: values.to_string(),
            max_flows: "16".to_string(),
            protocol: "6".to_string(),
            direction: "1".to_string(),
        }
    }

    fn table_with_ports(ports: Vec<PortStatus>) -> SwitchTable {
        let table = SwitchTable::new(100);
        table.connect(Arc::new(RecordingSwitch::new(OUTPUT, ports)));
        table
    }

    fn all_up() -> Vec<PortStatus> {
        vec![PortStatus::up(1), PortStatus::up(2), PortStatus::up(3)]
    }

    fn pair_ports(group: &Group) -> Vec<u16> {
        group
            .rules()
            .chunks(2)
            .map(|pair| pair[0].primary_port().map_or(0, |p| p.as_u16()))
            .collect()
    }

    #[test]
    fn test_configure_seeds_live_ports() {
        let table = table_with_ports(vec![
            PortStatus::up(3),
            PortStatus::down(2),
            PortStatus::up(1),
            PortStatus::up(7),
        ]);
        let group = Group::configure(&spec("1", "10.0.0.0/16", "1,2,3"), &table).unwrap();
        assert_eq!(group.live_ports(), &[PortNo::new(3), PortNo::new(1)]);
        assert!(group.rules().is_empty());
    }

    #[test]
    fn test_configure_without_switch() {
        let table = SwitchTable::new(100);
        let group = Group::configure(&spec("1", "10.0.0.0/16", "1,2,3"), &table).unwrap();
        assert!(group.live_ports().is_empty());
        assert_eq!(group.output_ports().len(), 3);
    }

    #[test]
    fn test_configure_rejects_malformed_spec() {
        let table = table_with_ports(all_up());
        let err = Group::configure(&spec("1", "10.0.0.0/16", "1,two"), &table).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_network_prefix_rules_are_paired() {
        let table = table_with_ports(all_up());
        let mut group = Group::configure(&spec("1", "10.0.0.0/16", "1,2,3"), &table).unwrap();
        group.generate(&table).unwrap();

        // 16 flows for one value: budget 8, two rules per /19
        let rules = group.rules();
        assert_eq!(rules.len(), 16);
        for (index, rule) in rules.iter().enumerate() {
            let sibling = &rules[rule.pair.unwrap()];
            assert_eq!(sibling.pair, Some(index));
            assert_eq!(sibling.priority, rule.priority);
            assert_eq!(sibling.output, rule.output);
            assert_eq!(rule.flow_match.direction_swapped(), Some(sibling.flow_match));
        }

        let expected = "10.0.32.0/19".parse::<Ipv4Prefix>().unwrap();
        assert_eq!(rules[2].flow_match, FlowMatch::network_source(expected));
        assert_eq!(rules[3].flow_match, FlowMatch::network_destination(expected));
        assert_eq!(pair_ports(&group), vec![1, 2, 3, 1, 2, 3, 1, 2]);
    }

    #[test]
    fn test_cursor_spans_values() {
        let table = table_with_ports(all_up());
        let mut group = Group::configure(
            &spec("1", "10.0.0.0/24,10.1.0.0/24", "1,2,3"),
            &table,
        )
        .unwrap();
        group.generate(&table).unwrap();

        // 16 flows over two values: budget 4 each
        assert_eq!(pair_ports(&group), vec![1, 2, 3, 1, 2, 3, 1, 2]);
    }

    #[test]
    fn test_round_robin_fairness() {
        let table = table_with_ports(all_up());
        let mut s = spec("1", "10.0.0.0/8", "1,2,3");
        s.max_flows = "64".to_string();
        let mut group = Group::configure(&s, &table).unwrap();
        group.generate(&table).unwrap();

        let pairs = pair_ports(&group);
        assert_eq!(pairs.len(), 32);
        for port in 1..=3 {
            let count = pairs.iter().filter(|p| **p == port).count();
            assert!(count == 10 || count == 11, "port {} got {}", port, count);
        }
    }

    #[test]
    fn test_generate_is_idempotent_with_auto_priority() {
        let table = table_with_ports(all_up());
        let mut s = spec("1", "10.0.0.0/16", "1,2,3");
        s.priority = AUTO_PRIORITY.to_string();
        let mut group = Group::configure(&s, &table).unwrap();

        group.generate(&table).unwrap();
        let first = group.rules().to_vec();
        group.generate(&table).unwrap();
        assert_eq!(group.rules(), first.as_slice());

        // one priority per pair: 101..=108
        let priorities: Vec<u16> = first.chunks(2).map(|pair| pair[0].priority).collect();
        assert_eq!(priorities, (101..=108).collect::<Vec<u16>>());
        assert_eq!(table.next_priority(OUTPUT), 109);
    }

    #[test]
    fn test_value_edit_releases_old_priorities() {
        let table = table_with_ports(all_up());
        let mut s = spec("1", "10.0.0.0/16", "1,2,3");
        s.priority = AUTO_PRIORITY.to_string();
        let mut group = Group::configure(&s, &table).unwrap();
        group.generate(&table).unwrap();
        assert_eq!(group.assigned_priorities.len(), 8);

        assert!(group.remove_value("10.0.0.0/16").unwrap());
        assert!(group.add_value("10.1.0.0/16").unwrap());
        group.generate(&table).unwrap();

        assert_eq!(group.assigned_priorities.len(), 8);
        for rule in group.rules() {
            assert!(rule.priority >= 109, "stale priority on {}", rule);
        }
        assert_eq!(table.next_priority(OUTPUT), 117);
    }

    #[test]
    fn test_transport_rules() {
        let table = table_with_ports(vec![PortStatus::up(1), PortStatus::up(2)]);
        let mut group = Group::configure(&spec("2", "80,443,8080", "1,2"), &table).unwrap();
        group.generate(&table).unwrap();

        let rules = group.rules();
        assert_eq!(rules.len(), 3);
        assert_eq!(
            rules[1].flow_match,
            FlowMatch::transport(6, flowscale_openflow::TransportDirection::Destination, 443)
        );
        let ports: Vec<_> = rules.iter().map(|r| r.output).collect();
        assert_eq!(
            ports,
            vec![
                RuleOutput::Port(PortNo::new(1)),
                RuleOutput::Port(PortNo::new(2)),
                RuleOutput::Port(PortNo::new(1)),
            ]
        );
        assert!(rules.iter().all(|r| r.pair.is_none() && r.priority == 200));
    }

    #[test]
    fn test_drop_group_rules() {
        let table = table_with_ports(all_up());
        let mut group = Group::configure(&spec("3", "0806,86dd", ""), &table).unwrap();
        assert!(group.is_drop());
        group.generate(&table).unwrap();

        assert_eq!(group.rules().len(), 2);
        for rule in group.rules() {
            assert_eq!(rule.output, RuleOutput::Drop);
            assert_eq!(rule.wire_length(), 72);
        }
    }

    #[test]
    fn test_no_live_ports_skips_every_kind() {
        let table = table_with_ports(vec![PortStatus::down(1)]);
        for (kind, values) in [("1", "10.0.0.0/16"), ("2", "80"), ("3", "0800")] {
            let mut group = Group::configure(&spec(kind, values, "1"), &table).unwrap();
            group.generate(&table).unwrap();
            assert!(group.rules().is_empty(), "kind {}", kind);
        }
    }

    #[test]
    fn test_exhausted_budget_aborts_generation() {
        let table = table_with_ports(all_up());
        let mut s = spec("1", "10.0.0.0/16,10.1.0.0/16", "1,2,3");
        s.max_flows = "3".to_string();
        let mut group = Group::configure(&s, &table).unwrap();

        let err = group.generate(&table).unwrap_err();
        assert!(matches!(
            err,
            FlowscaleError::PartitionBudget { group_id: 1, .. }
        ));
        assert!(group.rules().is_empty());
    }

    #[test]
    fn test_live_port_tracking() {
        let table = table_with_ports(vec![PortStatus::up(1)]);
        let mut group = Group::configure(&spec("1", "10.0.0.0/16", "1,2"), &table).unwrap();

        assert!(group.mark_port_up(PortNo::new(2)));
        assert!(!group.mark_port_up(PortNo::new(2)));
        assert!(!group.mark_port_up(PortNo::new(9)));
        assert_eq!(group.live_ports(), &[PortNo::new(1), PortNo::new(2)]);

        assert!(group.mark_port_down(PortNo::new(1)));
        assert!(!group.mark_port_down(PortNo::new(1)));
        assert_eq!(group.live_ports(), &[PortNo::new(2)]);
    }

    #[test]
    fn test_output_port_edits() {
        let table = SwitchTable::new(100);
        let mut group = Group::configure(&spec("1", "10.0.0.0/16", "1"), &table).unwrap();
        assert!(group.add_output_port(PortNo::new(4)).unwrap());
        assert!(!group.add_output_port(PortNo::new(4)).unwrap());
        assert!(group.add_output_port(PortNo::NONE).unwrap_err().is_configuration());
        assert!(group.remove_output_port(PortNo::new(1)).unwrap());
        assert_eq!(group.output_ports(), &[PortNo::new(4)]);

        let mut drop = Group::configure(&spec("3", "0800", ""), &table).unwrap();
        assert!(drop.add_output_port(PortNo::new(1)).is_err());
    }
}
