//! ALINEA feedback ramp metering.
//!
//! ```text
//! rate(t) = clamp(rate(t−1) + gain · (ρ* − ρ(t)), min, max)
//! gain    = v / L                          (1/s)
//! ρ*      = (capacity / v) · lanes · L     (vehicles at critical density)
//! ```
//!
//! `ρ(t)` is the vehicle count on the link of the controller's first sensor,
//! and `v`, `capacity`, `lanes`, `L` are that link's parameters.

use std::collections::BTreeMap;

use ctm_core::{ActuatorId, ControllerId, LinkId, SensorId, ValidationLog};

use crate::{Actuator, ActuatorKind, Command, ControlContext, ControlError, ControlResult};

/// Starting rate per lane when the meter has no finite maximum, veh/h.
const DEFAULT_RATE_VPHPL: f64 = 900.0;

#[derive(Clone, Debug, Default)]
pub struct Alinea {
    binding: Option<AlineaBinding>,
}

/// Constants derived from the measured link at initialization.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AlineaBinding {
    pub gain_per_sec:    f64,
    pub ref_density_veh: f64,
    pub ref_link:        LinkId,
}

impl Alinea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binding(&self) -> Option<&AlineaBinding> {
        self.binding.as_ref()
    }

    pub(crate) fn validate(
        &self,
        id: ControllerId,
        actuators: &[ActuatorId],
        sensors: &[SensorId],
        all_actuators: &[Actuator],
        log: &mut ValidationLog,
    ) {
        if sensors.is_empty() {
            log.add_error(format!("{id}: ALINEA needs a sensor on the mainline"));
        }
        for &a in actuators {
            if let Some(act) = all_actuators.get(a.index()) {
                if !matches!(act.kind, ActuatorKind::Meter { .. }) {
                    log.add_error(format!("{id}: ALINEA drives meters only, {a} is not one"));
                }
            }
        }
    }

    pub(crate) fn initialize(
        &mut self,
        id: ControllerId,
        actuators: &[ActuatorId],
        sensors: &[SensorId],
        command: &mut BTreeMap<ActuatorId, Command>,
        ctx: &ControlContext<'_>,
    ) -> ControlResult<()> {
        let sensor_id = *sensors.first().ok_or_else(|| ControlError::Config {
            controller: id,
            reason: "ALINEA needs a sensor on the mainline".into(),
        })?;
        let sensor = ctx
            .sensors
            .get(sensor_id.index())
            .ok_or(ControlError::UnknownSensor(sensor_id))?;
        let link = ctx.net.link(sensor.link)?;
        let p = &link.road_params;
        let binding = AlineaBinding {
            gain_per_sec:    p.speed_kph * 1_000.0 / 3_600.0 / link.length_m,
            ref_density_veh: p.critical_density_vpkpl() * link.full_lanes as f64 * link.length_m / 1_000.0,
            ref_link:        link.id,
        };

        for &a in actuators {
            let act = ctx.actuators.get(a.index()).ok_or(ControlError::UnknownActuator(a))?;
            let mut links = act
                .target
                .lanegroups()
                .iter()
                .map(|&lg| ctx.net.lanegroup(lg).map(|g| g.link))
                .collect::<Result<Vec<LinkId>, _>>()?;
            links.sort();
            links.dedup();
            if links.len() != 1 {
                return Err(ControlError::Config {
                    controller: id,
                    reason: format!("lane groups metered by {a} must all be on one link"),
                });
            }
            let initial = match act.kind {
                ActuatorKind::Meter { max_rate_vps, .. } if max_rate_vps.is_finite() => max_rate_vps,
                _ => link.full_lanes as f64 * DEFAULT_RATE_VPHPL / 3_600.0,
            };
            command.insert(a, Command::Rate(initial));
        }
        self.binding = Some(binding);
        Ok(())
    }

    pub(crate) fn update_command(
        &self,
        id: ControllerId,
        command: &mut BTreeMap<ActuatorId, Command>,
        ctx: &ControlContext<'_>,
    ) -> ControlResult<()> {
        let b = self.binding.ok_or_else(|| ControlError::Config {
            controller: id,
            reason: "ALINEA is not bound to a link".into(),
        })?;
        let density_veh = ctx.flow.link_vehicles(ctx.net, b.ref_link)?;
        for (&a, cmd) in command.iter_mut() {
            let act = ctx.actuators.get(a.index()).ok_or(ControlError::UnknownActuator(a))?;
            let previous = match cmd {
                Command::Rate(r) => *r,
                _ => 0.0,
            };
            *cmd = Command::Rate(act.clamp_rate(previous + b.gain_per_sec * (b.ref_density_veh - density_veh)));
        }
        Ok(())
    }
}
