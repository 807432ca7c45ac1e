//! `Controller`: lifecycle, poke scheduling, and the published commands.
//!
//! # State machine
//!
//! ```text
//! Uninitialized ──initialize──▶ Initialized ──first poke──▶ Active
//!                                                            │
//!                                  poke at or after end_time ▼
//!                                                         Expired
//! ```
//!
//! Expiry clears every command, so each actuator reverts at the next model
//! update, and undoes any lane-selector swap.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use ctm_core::{ActuatorId, ControllerId, SensorId, SimTime, ValidationLog};
use ctm_dispatch::{Action, Event};
use ctm_network::Network;

use crate::{
    Actuator, Alinea, Command, ControlContext, ControlError, ControlResult, FixedSensor,
    FixedTimeSignal, ProfileRate, TollLaneGroup,
};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ControllerState {
    #[default]
    Uninitialized,
    Initialized,
    Active,
    Expired,
}

#[derive(Clone, Debug)]
pub enum ControllerKind {
    Alinea(Alinea),
    ProfileRate(ProfileRate),
    TollLaneGroup(TollLaneGroup),
    FixedTimeSignal(FixedTimeSignal),
}

impl ControllerKind {
    fn name(&self) -> &'static str {
        match self {
            ControllerKind::Alinea(_) => "alinea",
            ControllerKind::ProfileRate(_) => "profile rate",
            ControllerKind::TollLaneGroup(_) => "toll lane group",
            ControllerKind::FixedTimeSignal(_) => "fixed-time signal",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Controller {
    pub id:         ControllerId,
    pub kind:       ControllerKind,
    pub actuators:  Vec<ActuatorId>,
    pub sensors:    Vec<SensorId>,
    /// Poke period.  Fixed-time signals are poked at stage changes instead.
    pub dt_secs:    f64,
    pub start_time: SimTime,
    pub end_time:   Option<SimTime>,
    state:   ControllerState,
    command: BTreeMap<ActuatorId, Command>,
}

impl Controller {
    pub fn new(
        id: ControllerId,
        kind: ControllerKind,
        actuators: Vec<ActuatorId>,
        sensors: Vec<SensorId>,
        dt_secs: f64,
    ) -> Self {
        Self {
            id,
            kind,
            actuators,
            sensors,
            dt_secs,
            start_time: SimTime::ZERO,
            end_time: None,
            state: ControllerState::Uninitialized,
            command: BTreeMap::new(),
        }
    }

    /// Only act within `[start, end)`.
    pub fn active_between(mut self, start: SimTime, end: Option<SimTime>) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn command(&self) -> &BTreeMap<ActuatorId, Command> {
        &self.command
    }

    pub fn command_for(&self, actuator: ActuatorId) -> Option<&Command> {
        self.command.get(&actuator)
    }

    pub fn validate(&self, net: &Network, sensors: &[FixedSensor], actuators: &[Actuator], log: &mut ValidationLog) {
        let id = self.id;
        if !matches!(self.kind, ControllerKind::FixedTimeSignal(_)) && !(self.dt_secs > 0.0) {
            log.add_error(format!("{id}: poke period must be positive"));
        }
        if self.end_time.is_some_and(|end| end <= self.start_time) {
            log.add_error(format!("{id}: ends before it starts"));
        }
        for &a in &self.actuators {
            match actuators.get(a.index()) {
                None => log.add_error(format!("{id}: unknown actuator {a}")),
                Some(act) if act.controller.is_some_and(|c| c != id) => {
                    log.add_error(format!("{id}: {a} already belongs to another controller"))
                }
                Some(_) => {}
            }
        }
        for &s in &self.sensors {
            if sensors.get(s.index()).is_none() {
                log.add_error(format!("{id}: unknown sensor {s}"));
            }
        }
        match &self.kind {
            ControllerKind::Alinea(k) => k.validate(id, &self.actuators, &self.sensors, actuators, log),
            ControllerKind::ProfileRate(k) => k.validate(id, &self.actuators, actuators, log),
            ControllerKind::TollLaneGroup(k) => k.validate(id, &self.actuators, actuators, log),
            ControllerKind::FixedTimeSignal(k) => k.validate(id, &self.actuators, actuators, net, log),
        }
    }

    /// Bind to actuators and sensors and schedule the first poke.
    pub fn initialize(&mut self, ctx: &mut ControlContext<'_>) -> ControlResult<()> {
        let Controller { id, kind, actuators, sensors, dt_secs, command, .. } = self;
        command.clear();
        match kind {
            ControllerKind::Alinea(k) => k.initialize(*id, actuators, sensors, command, ctx)?,
            ControllerKind::TollLaneGroup(k) => k.initialize(*id, actuators, *dt_secs, ctx)?,
            ControllerKind::ProfileRate(_) | ControllerKind::FixedTimeSignal(_) => {}
        }
        self.state = ControllerState::Initialized;

        let first = ctx.dispatcher.current_time().max(self.start_time);
        ctx.dispatcher.register_event(Event::new(first, Action::PokeController(self.id)))?;
        info!("{} ({}) initialized, first poke at {first}", self.id, self.kind.name());
        Ok(())
    }

    /// One controller update, then schedule the next.
    pub fn poke(&mut self, ctx: &mut ControlContext<'_>) -> ControlResult<()> {
        let now = ctx.dispatcher.current_time();
        match self.state {
            ControllerState::Uninitialized => {
                return Err(ControlError::Config {
                    controller: self.id,
                    reason: "poked before initialization".into(),
                });
            }
            ControllerState::Expired => {
                warn!("{} poked at {now} after expiry", self.id);
                return Ok(());
            }
            ControllerState::Initialized | ControllerState::Active => {}
        }
        if self.end_time.is_some_and(|end| now >= end) {
            return self.expire(ctx);
        }
        if self.state == ControllerState::Initialized {
            info!("{} active at {now}", self.id);
            self.state = ControllerState::Active;
        }

        let Controller { id, kind, actuators, command, .. } = self;
        match kind {
            ControllerKind::Alinea(k) => k.update_command(*id, command, ctx)?,
            ControllerKind::ProfileRate(k) => k.update_command(now, command),
            ControllerKind::TollLaneGroup(k) => k.update_command(actuators, command, ctx)?,
            ControllerKind::FixedTimeSignal(k) => k.update_command(actuators, now, command),
        }
        debug!("{} at {now}: {:?}", self.id, self.command);

        if let Some(next) = self.next_poke(now) {
            ctx.dispatcher.register_event(Event::new(next, Action::PokeController(self.id)))?;
        }
        Ok(())
    }

    fn next_poke(&self, now: SimTime) -> Option<SimTime> {
        let next = match &self.kind {
            ControllerKind::FixedTimeSignal(s) => s.stage_at(now).map(|(_, end)| end)?,
            _ if self.dt_secs > 0.0 => now.offset_secs(self.dt_secs),
            _ => return None,
        };
        Some(self.end_time.map_or(next, |end| next.min(end)))
    }

    fn expire(&mut self, ctx: &mut ControlContext<'_>) -> ControlResult<()> {
        if let ControllerKind::TollLaneGroup(k) = &mut self.kind {
            k.restore(ctx)?;
        }
        self.command.clear();
        self.state = ControllerState::Expired;
        info!("{} expired at {}", self.id, ctx.dispatcher.current_time());
        Ok(())
    }
}
