//! Ramp metering from a preloaded rate profile per meter.

use std::collections::BTreeMap;

use ctm_core::{ActuatorId, ControllerId, Profile1D, SimTime, ValidationLog};

use crate::{Actuator, ActuatorKind, Command};

#[derive(Clone, Debug, Default)]
pub struct ProfileRate {
    /// Metering rate in veh/h, per actuator.
    pub profiles: BTreeMap<ActuatorId, Profile1D>,
}

impl ProfileRate {
    pub fn new(profiles: BTreeMap<ActuatorId, Profile1D>) -> Self {
        Self { profiles }
    }

    pub(crate) fn validate(
        &self,
        id: ControllerId,
        actuators: &[ActuatorId],
        all_actuators: &[Actuator],
        log: &mut ValidationLog,
    ) {
        for (&a, profile) in &self.profiles {
            if !actuators.contains(&a) {
                log.add_error(format!("{id}: rate profile for {a}, which it does not drive"));
            } else if let Some(act) = all_actuators.get(a.index()) {
                if !matches!(act.kind, ActuatorKind::Meter { .. }) {
                    log.add_error(format!("{id}: {a} is not a meter"));
                }
            }
            profile.validate(&format!("{id} rate for {a}"), log);
        }
    }

    pub(crate) fn update_command(&self, now: SimTime, command: &mut BTreeMap<ActuatorId, Command>) {
        for (&a, profile) in &self.profiles {
            command.insert(a, Command::Rate(profile.value_at(now.as_secs()) / 3_600.0));
        }
    }
}
