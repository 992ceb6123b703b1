//! Group policy types: the textual form operators provide and the parsed
//! form the engine works on.

use flowscale_openflow::TransportDirection;
use flowscale_types::{parse_hex_u16, DatapathId, Ipv4Prefix, PortNo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{FlowscaleError, Result};

/// Priority value meaning "allocate the next priority of the output switch".
pub const AUTO_PRIORITY: u16 = 100;

/// What a group's values are matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    NetworkPrefix,
    TransportPort,
    EtherType,
}

impl MatchKind {
    /// Numeric code used by the policy text form.
    pub const fn code(&self) -> u8 {
        match self {
            Self::NetworkPrefix => 1,
            Self::TransportPort => 2,
            Self::EtherType => 3,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::NetworkPrefix),
            2 => Some(Self::TransportPort),
            3 => Some(Self::EtherType),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkPrefix => "network_prefix",
            Self::TransportPort => "transport_port",
            Self::EtherType => "ether_type",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MatchKind {
    type Err = FlowscaleError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let by_code = s.parse::<u8>().ok().and_then(Self::from_code);
        by_code
            .or(match s {
                "network_prefix" => Some(Self::NetworkPrefix),
                "transport_port" => Some(Self::TransportPort),
                "ether_type" => Some(Self::EtherType),
                _ => None,
            })
            .ok_or_else(|| {
                FlowscaleError::configuration("type", format!("unknown match kind: {}", s))
            })
    }
}

/// Parses a transport direction code: 0 (source) or 1 (destination).
pub fn parse_direction(s: &str) -> Result<TransportDirection> {
    match s.trim() {
        "0" | "source" => Ok(TransportDirection::Source),
        "1" | "destination" => Ok(TransportDirection::Destination),
        other => Err(FlowscaleError::configuration(
            "direction",
            format!("unknown transport direction: {}", other),
        )),
    }
}

/// The typed values of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchSpec {
    NetworkPrefix(Vec<Ipv4Prefix>),
    TransportPort {
        protocol: u8,
        direction: TransportDirection,
        ports: Vec<u16>,
    },
    EtherType(Vec<u16>),
}

impl MatchSpec {
    pub fn kind(&self) -> MatchKind {
        match self {
            Self::NetworkPrefix(_) => MatchKind::NetworkPrefix,
            Self::TransportPort { .. } => MatchKind::TransportPort,
            Self::EtherType(_) => MatchKind::EtherType,
        }
    }

    /// Number of configured values.
    pub fn len(&self) -> usize {
        match self {
            Self::NetworkPrefix(prefixes) => prefixes.len(),
            Self::TransportPort { ports, .. } => ports.len(),
            Self::EtherType(types) => types.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values in their canonical text form.
    pub fn values(&self) -> Vec<String> {
        match self {
            Self::NetworkPrefix(prefixes) => prefixes.iter().map(|p| p.to_string()).collect(),
            Self::TransportPort { ports, .. } => ports.iter().map(|p| p.to_string()).collect(),
            Self::EtherType(types) => types.iter().map(|t| format!("0x{:04x}", t)).collect(),
        }
    }

    /// Adds one value given as text. Returns false if it was already present.
    pub fn add_value(&mut self, text: &str) -> Result<bool> {
        match self {
            Self::NetworkPrefix(prefixes) => Ok(insert_unique(prefixes, parse_prefix(text)?)),
            Self::TransportPort { ports, .. } => Ok(insert_unique(ports, parse_transport_port(text)?)),
            Self::EtherType(types) => Ok(insert_unique(types, parse_ether_type(text)?)),
        }
    }

    /// Removes one value given as text. Returns false if it was absent.
    pub fn remove_value(&mut self, text: &str) -> Result<bool> {
        match self {
            Self::NetworkPrefix(prefixes) => Ok(remove_item(prefixes, &parse_prefix(text)?)),
            Self::TransportPort { ports, .. } => {
                Ok(remove_item(ports, &parse_transport_port(text)?))
            }
            Self::EtherType(types) => Ok(remove_item(types, &parse_ether_type(text)?)),
        }
    }
}

fn insert_unique<T: PartialEq>(items: &mut Vec<T>, item: T) -> bool {
    if items.contains(&item) {
        return false;
    }
    items.push(item);
    true
}

fn remove_item<T: PartialEq>(items: &mut Vec<T>, item: &T) -> bool {
    let before = items.len();
    items.retain(|existing| existing != item);
    items.len() != before
}

fn parse_prefix(s: &str) -> Result<Ipv4Prefix> {
    s.trim()
        .parse()
        .map_err(|e| FlowscaleError::parse("values", e))
}

fn parse_transport_port(s: &str) -> Result<u16> {
    s.trim().parse().map_err(|_| {
        FlowscaleError::configuration("values", format!("invalid transport port: {}", s))
    })
}

fn parse_ether_type(s: &str) -> Result<u16> {
    parse_hex_u16(s.trim()).map_err(|e| FlowscaleError::parse("values", e))
}

/// Splits a comma separated list. An empty string is an empty list, an
/// empty element is an error. Duplicates keep their first position.
fn parse_list<T, F>(field: &str, text: &str, parse: F) -> Result<Vec<T>>
where
    T: PartialEq,
    F: Fn(&str) -> Result<T>,
{
    let mut items = Vec::new();
    if text.trim().is_empty() {
        return Ok(items);
    }
    for raw in text.split(',') {
        if raw.trim().is_empty() {
            return Err(FlowscaleError::configuration(
                field,
                format!("empty element in list: {:?}", text),
            ));
        }
        insert_unique(&mut items, parse(raw)?);
    }
    Ok(items)
}

fn parse_number<T: FromStr>(field: &str, text: &str) -> Result<T> {
    text.trim().parse().map_err(|_| {
        FlowscaleError::configuration(field, format!("not a valid number: {:?}", text))
    })
}

fn parse_port(field: &str, text: &str) -> Result<PortNo> {
    let port: PortNo = text
        .trim()
        .parse()
        .map_err(|e| FlowscaleError::parse(field, e))?;
    if !port.is_physical() {
        return Err(FlowscaleError::configuration(
            field,
            format!("reserved port number: {}", port),
        ));
    }
    Ok(port)
}

/// A group policy as text, the way an operator UI or database row holds it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub input_switch: String,
    pub output_switch: String,
    #[serde(default)]
    pub input_ports: String,
    /// Empty for a drop group.
    #[serde(default)]
    pub output_ports: String,
    /// Match kind code: 1 network prefix, 2 transport port, 3 ether type.
    pub kind: String,
    pub priority: String,
    pub values: String,
    pub max_flows: String,
    /// IP protocol number, transport port groups only.
    #[serde(default)]
    pub protocol: String,
    /// 0 source, 1 destination; transport port groups only.
    #[serde(default)]
    pub direction: String,
}

impl GroupSpec {
    /// Parses every field. Nothing is partially accepted.
    pub fn parse(&self) -> Result<GroupConfig> {
        let id = parse_number("id", &self.id)?;
        let input_switch = self
            .input_switch
            .trim()
            .parse()
            .map_err(|e| FlowscaleError::parse("input_switch", e))?;
        let output_switch = self
            .output_switch
            .trim()
            .parse()
            .map_err(|e| FlowscaleError::parse("output_switch", e))?;
        let input_ports = parse_list("input_ports", &self.input_ports, |s| {
            parse_port("input_ports", s)
        })?;
        let output_ports = parse_list("output_ports", &self.output_ports, |s| {
            parse_port("output_ports", s)
        })?;
        let priority = parse_number("priority", &self.priority)?;
        let max_flows = parse_number("max_flows", &self.max_flows)?;

        let match_spec = match self.kind.parse::<MatchKind>()? {
            MatchKind::NetworkPrefix => {
                MatchSpec::NetworkPrefix(parse_list("values", &self.values, parse_prefix)?)
            }
            MatchKind::TransportPort => MatchSpec::TransportPort {
                protocol: parse_number("protocol", &self.protocol)?,
                direction: parse_direction(&self.direction)?,
                ports: parse_list("values", &self.values, parse_transport_port)?,
            },
            MatchKind::EtherType => {
                MatchSpec::EtherType(parse_list("values", &self.values, parse_ether_type)?)
            }
        };
        if match_spec.is_empty() {
            return Err(FlowscaleError::configuration("values", "no values given"));
        }

        Ok(GroupConfig {
            id,
            name: self.name.clone(),
            input_switch,
            output_switch,
            input_ports,
            output_ports,
            match_spec,
            priority,
            max_flows,
        })
    }
}

/// A parsed group policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub id: u32,
    pub name: String,
    pub input_switch: DatapathId,
    pub output_switch: DatapathId,
    pub input_ports: Vec<PortNo>,
    pub output_ports: Vec<PortNo>,
    pub match_spec: MatchSpec,
    pub priority: u16,
    pub max_flows: u32,
}

/// An edit applied to a running group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupEdit {
    AddPort(PortNo),
    RemovePort(PortNo),
    AddValue(String),
    RemoveValue(String),
}

impl fmt::Display for GroupEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddPort(port) => write!(f, "add port {}", port),
            Self::RemovePort(port) => write!(f, "remove port {}", port),
            Self::AddValue(value) => write!(f, "add value {}", value),
            Self::RemoveValue(value) => write!(f, "remove value {}", value),
        }
    }
}
