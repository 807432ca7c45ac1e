//! Fixed-time (pretimed) signal control of one node.

use std::collections::{BTreeMap, BTreeSet};

use ctm_core::{ActuatorId, ControllerId, RoadConnectionId, SimTime, ValidationLog};
use ctm_network::Network;

use crate::{Actuator, ActuatorKind, ActuatorTarget, Command};

/// One stage of the cycle: which road connections are green, and for how long.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalStage {
    pub duration_secs: f64,
    pub green:         BTreeSet<RoadConnectionId>,
}

/// Stages run in order and the cycle repeats.  At absolute time
/// `offset_secs` the first stage begins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FixedTimeSignal {
    pub offset_secs: f64,
    pub stages:      Vec<SignalStage>,
}

impl FixedTimeSignal {
    pub fn new(offset_secs: f64, stages: Vec<SignalStage>) -> Self {
        Self { offset_secs, stages }
    }

    fn durations_ms(&self) -> Vec<u64> {
        self.stages.iter().map(|s| SimTime::from_secs(s.duration_secs).0).collect()
    }

    pub fn cycle_secs(&self) -> f64 {
        SimTime(self.durations_ms().iter().sum()).as_secs()
    }

    /// Index of the stage in effect at `t` and the time it ends.
    pub fn stage_at(&self, t: SimTime) -> Option<(usize, SimTime)> {
        let durations = self.durations_ms();
        let cycle: u64 = durations.iter().sum();
        if cycle == 0 {
            return None;
        }
        let offset = SimTime::from_secs(self.offset_secs).0 % cycle;
        let into_cycle = (t.0 + cycle - offset) % cycle;
        let mut stage_end = 0;
        for (i, d) in durations.iter().enumerate() {
            stage_end += d;
            if into_cycle < stage_end {
                return Some((i, t + (stage_end - into_cycle)));
            }
        }
        None
    }

    pub(crate) fn validate(
        &self,
        id: ControllerId,
        actuators: &[ActuatorId],
        all_actuators: &[Actuator],
        net: &Network,
        log: &mut ValidationLog,
    ) {
        if self.stages.is_empty() || self.durations_ms().iter().sum::<u64>() == 0 {
            log.add_error(format!("{id}: signal cycle must have a positive length"));
        }
        if self.stages.iter().any(|s| !(s.duration_secs >= 0.0)) {
            log.add_error(format!("{id}: stage durations must be non-negative"));
        }
        let [a] = actuators else {
            log.add_error(format!("{id}: a fixed-time signal drives exactly one actuator"));
            return;
        };
        let Some(act) = all_actuators.get(a.index()) else { return };
        let (ActuatorKind::Signal, ActuatorTarget::Node(node)) = (&act.kind, &act.target) else {
            log.add_error(format!("{id}: {a} is not a signal"));
            return;
        };
        let Ok(node) = net.node(*node) else { return };
        for rc in self.stages.iter().flat_map(|s| &s.green) {
            if !node.road_connections.contains(rc) {
                log.add_error(format!("{id}: {rc} does not cross {}", node.id));
            }
        }
    }

    pub(crate) fn update_command(
        &self,
        actuators: &[ActuatorId],
        now: SimTime,
        command: &mut BTreeMap<ActuatorId, Command>,
    ) {
        if let Some((i, _)) = self.stage_at(now) {
            for &a in actuators {
                command.insert(a, Command::SignalPhase(self.stages[i].green.clone()));
            }
        }
    }
}
