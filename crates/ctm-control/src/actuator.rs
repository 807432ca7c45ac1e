//! Actuators: the only path from a controller's command to the flow model.
//!
//! At the start of every model update the simulation hands each actuator the
//! command its controller currently publishes (or `None`) and the actuator
//! writes the corresponding setting into the flow model:
//!
//! | Kind                 | Target           | Command        | Effect                         |
//! |----------------------|------------------|----------------|--------------------------------|
//! | `Meter`              | lane group(s)    | `Rate`         | node outflow capped per step   |
//! | `OpenCloseLaneGroup` | lane group(s)    | `Restrictions` | commodities opened / closed    |
//! | `Signal`             | node             | `SignalPhase`  | non-green road connections red |
//!
//! With no command the actuator reverts: meter off, every commodity open,
//! every road connection green.

use std::collections::{BTreeMap, BTreeSet};

use ctm_core::{ActuatorId, CommodityId, ControllerId, LaneGroupId, NodeId, RoadConnectionId, ValidationLog};
use ctm_flow::{FlowModel, Restriction};
use ctm_network::Network;

use crate::{ControlError, ControlResult};

#[derive(Clone, Debug, PartialEq)]
pub enum ActuatorKind {
    /// Ramp meter.  Commanded rates are clamped to `[min, max]`.
    Meter { min_rate_vps: f64, max_rate_vps: f64 },
    OpenCloseLaneGroup,
    Signal,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ActuatorTarget {
    LaneGroup(LaneGroupId),
    LaneGroups(Vec<LaneGroupId>),
    Node(NodeId),
}

impl ActuatorTarget {
    /// Lane groups targeted, empty for a node target.
    pub fn lanegroups(&self) -> &[LaneGroupId] {
        match self {
            ActuatorTarget::LaneGroup(lg) => std::slice::from_ref(lg),
            ActuatorTarget::LaneGroups(lgs) => lgs,
            ActuatorTarget::Node(_) => &[],
        }
    }
}

/// What a controller asks of one actuator.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Metering rate over all target lane groups, veh/s.
    Rate(f64),
    Restrictions(BTreeMap<CommodityId, Restriction>),
    /// Road connections that are green; all others at the node are red.
    SignalPhase(BTreeSet<RoadConnectionId>),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Rate(_) => "rate",
            Command::Restrictions(_) => "restriction",
            Command::SignalPhase(_) => "signal phase",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Actuator {
    pub id:     ActuatorId,
    pub kind:   ActuatorKind,
    pub target: ActuatorTarget,
    /// Set when a controller claims the actuator.
    pub controller: Option<ControllerId>,
}

impl Actuator {
    pub fn new(id: ActuatorId, kind: ActuatorKind, target: ActuatorTarget) -> Self {
        Self { id, kind, target, controller: None }
    }

    /// A meter with no lower bound.
    pub fn meter(id: ActuatorId, max_rate_vps: f64, target: ActuatorTarget) -> Self {
        Self::new(id, ActuatorKind::Meter { min_rate_vps: 0.0, max_rate_vps }, target)
    }

    pub fn validate(&self, net: &Network, log: &mut ValidationLog) {
        let what = self.id;
        match (&self.kind, &self.target) {
            (ActuatorKind::Signal, ActuatorTarget::Node(n)) => {
                if let Err(e) = net.node(*n) {
                    log.add_error(format!("{what}: {e}"));
                }
            }
            (ActuatorKind::Signal, _) => log.add_error(format!("{what}: a signal must target a node")),
            (_, ActuatorTarget::Node(_)) => log.add_error(format!("{what}: only signals target nodes")),
            (_, target) => {
                if target.lanegroups().is_empty() {
                    log.add_error(format!("{what}: no target lane groups"));
                }
                for &lg in target.lanegroups() {
                    if let Err(e) = net.lanegroup(lg) {
                        log.add_error(format!("{what}: {e}"));
                    }
                }
            }
        }
        if let ActuatorKind::Meter { min_rate_vps, max_rate_vps } = self.kind {
            if !(min_rate_vps >= 0.0 && max_rate_vps >= min_rate_vps) {
                log.add_error(format!("{what}: meter needs 0 <= min rate <= max rate"));
            }
        }
    }

    /// Clamp a requested metering rate to this meter's range.
    pub fn clamp_rate(&self, rate_vps: f64) -> f64 {
        match self.kind {
            ActuatorKind::Meter { min_rate_vps, max_rate_vps } => rate_vps.clamp(min_rate_vps, max_rate_vps),
            _ => rate_vps,
        }
    }

    /// Write `command` into the flow model, or revert when there is none.
    pub fn apply(&self, command: Option<&Command>, net: &Network, flow: &mut FlowModel) -> ControlResult<()> {
        match (&self.kind, &self.target, command) {
            (ActuatorKind::Signal, ActuatorTarget::Node(n), cmd) => {
                let green = match cmd {
                    None => None,
                    Some(Command::SignalPhase(green)) => Some(green),
                    Some(other) => return Err(self.mismatch(other)),
                };
                for &rc in &net.node(*n)?.road_connections {
                    flow.set_red(rc, green.is_some_and(|g| !g.contains(&rc)));
                }
            }
            (ActuatorKind::Meter { .. }, target, cmd) if !matches!(target, ActuatorTarget::Node(_)) => {
                let rate_vps = match cmd {
                    None => None,
                    Some(Command::Rate(r)) => Some(self.clamp_rate(*r)),
                    Some(other) => return Err(self.mismatch(other)),
                };
                let lanes = target
                    .lanegroups()
                    .iter()
                    .map(|&lg| flow.lanegroup(lg).map(|g| g.num_lanes as f64))
                    .collect::<Result<Vec<f64>, _>>()?;
                let total_lanes: f64 = lanes.iter().sum();
                let dt = flow.dt_secs;
                for (&lg, n) in target.lanegroups().iter().zip(&lanes) {
                    flow.lanegroup_mut(lg)?.meter_veh_per_step =
                        rate_vps.map(|r| r * dt * n / total_lanes);
                }
            }
            (ActuatorKind::OpenCloseLaneGroup, target, cmd) if !matches!(target, ActuatorTarget::Node(_)) => {
                let restrictions = match cmd {
                    None => BTreeMap::new(),
                    Some(Command::Restrictions(r)) => r.clone(),
                    Some(other) => return Err(self.mismatch(other)),
                };
                for &lg in target.lanegroups() {
                    flow.lanegroup_mut(lg)?.restrictions = restrictions.clone();
                }
            }
            _ => return Err(ControlError::TargetMismatch { actuator: self.id }),
        }
        Ok(())
    }

    fn mismatch(&self, command: &Command) -> ControlError {
        ControlError::CommandMismatch { actuator: self.id, command: command.name() }
    }
}
