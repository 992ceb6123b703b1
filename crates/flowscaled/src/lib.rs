//! flowscale - OpenFlow traffic-steering engine
//!
//! Turns traffic-steering policies into OpenFlow 1.0 rules, spreads them
//! over the output ports of a switch, and keeps that spread balanced as
//! ports go up and down.
//!
//! # Architecture
//!
//! ```text
//! [host events] ──> [FlowscaleController] ──> [Group] ── generate ──> [Rule]s
//!                         │                                       │
//!                         ├──> [PortEventHandler] ── plan/apply ──┤
//!                         │                                       ↓
//!                         └──────────────────────────────> [RuleDeployer]
//!                                                                 │
//!                                                      [SwitchRegistry] ──> switch
//! ```
//!
//! # Key Components
//!
//! - [`group::Group`]: one policy, its live output ports and its rules
//! - [`deploy::RuleDeployer`]: batched installation and removal of rules
//! - [`rebalance::PortEventHandler`]: rule repair on port state changes
//! - [`switch::SwitchRegistry`]: the seam to connected switches
//! - [`controller::FlowscaleController`]: entry points for the host

pub mod config;
pub mod controller;
pub mod deploy;
pub mod error;
pub mod group;
pub mod rebalance;
pub mod switch;

pub use config::FlowscaleConfig;
pub use controller::FlowscaleController;
pub use deploy::{BatchPolicy, DeployStats, FlowWriter, RuleDeployer};
pub use error::{FlowscaleError, Result};
pub use group::{Group, GroupEdit, GroupSpec, MatchKind, Rule, RuleOutput};
pub use rebalance::{plan_port_down, plan_port_up, PortEventHandler, Reassignment};
pub use switch::{
    MirrorMap, RecordingSwitch, StreamSwitch, SwitchHandle, SwitchRegistry, SwitchTable,
};
