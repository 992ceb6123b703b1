//! A single forwarding rule owned by a group.

use flowscale_openflow::{ActionOutput, FlowMatch, FlowMod};
use flowscale_types::PortNo;
use std::fmt;

use crate::switch::MirrorMap;

/// Where matching traffic goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleOutput {
    Port(PortNo),
    Drop,
}

impl fmt::Display for RuleOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port(port) => write!(f, "output:{}", port),
            Self::Drop => write!(f, "drop"),
        }
    }
}

/// Match, priority and action of one flow.
///
/// Network prefix rules come in source/destination pairs; `pair` is the
/// index of the sibling in the owning group's rule list. Both siblings
/// always share priority and output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub flow_match: FlowMatch,
    pub priority: u16,
    pub output: RuleOutput,
    pub mirror: Option<PortNo>,
    pub pair: Option<usize>,
}

impl Rule {
    pub fn new(flow_match: FlowMatch, priority: u16, output: RuleOutput) -> Self {
        Self {
            flow_match,
            priority,
            output,
            mirror: None,
            pair: None,
        }
    }

    pub fn paired_with(mut self, sibling: usize) -> Self {
        self.pair = Some(sibling);
        self
    }

    /// The primary output port, `None` for drop rules.
    pub fn primary_port(&self) -> Option<PortNo> {
        match self.output {
            RuleOutput::Port(port) => Some(port),
            RuleOutput::Drop => None,
        }
    }

    /// Moves the rule to `port` and recomputes its mirror.
    pub fn assign(&mut self, port: PortNo, mirrors: Option<&MirrorMap>) {
        self.output = RuleOutput::Port(port);
        self.refresh_mirror(mirrors);
    }

    /// Looks up the mirror of the current primary port.
    pub fn refresh_mirror(&mut self, mirrors: Option<&MirrorMap>) {
        self.mirror = match (self.primary_port(), mirrors) {
            (Some(port), Some(mirrors)) => mirrors.get(&port).copied(),
            _ => None,
        };
    }

    /// Output actions: none when dropping, else the primary port followed
    /// by the mirror port if there is one.
    pub fn actions(&self) -> Vec<ActionOutput> {
        match self.primary_port() {
            Some(port) => std::iter::once(port)
                .chain(self.mirror)
                .map(ActionOutput::new)
                .collect(),
            None => Vec::new(),
        }
    }

    /// The insertion that installs this rule.
    pub fn to_flow_mod(&self) -> FlowMod {
        FlowMod::add(self.flow_match, self.priority, self.actions())
    }

    /// The strict deletion that removes this rule.
    pub fn to_delete(&self) -> FlowMod {
        FlowMod::delete_strict(self.flow_match, self.priority)
    }

    /// Byte length of the installing message.
    pub fn wire_length(&self) -> u16 {
        self.to_flow_mod().length()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "priority={} match=[{}] {}",
            self.priority, self.flow_match, self.output
        )?;
        if let Some(mirror) = self.mirror {
            write!(f, ",mirror:{}", mirror)?;
        }
        Ok(())
    }
}
