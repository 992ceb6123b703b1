//! Traffic-steering groups.
//!
//! A group turns one policy (which traffic, which output switch and ports)
//! into OpenFlow rules and keeps them balanced over the ports that are up.

mod orch;
mod rule;
mod types;

pub use orch::Group;
pub use rule::{Rule, RuleOutput};
pub use types::{
    parse_direction, GroupConfig, GroupEdit, GroupSpec, MatchKind, MatchSpec, AUTO_PRIORITY,
};
