//! Lane-group tolling (HOT lanes).
//!
//! The actuator's lane groups are the tolled ("hot") lanes.  Each one must
//! have an outer neighbor, the general-purpose lane group whose tolled
//! commodities decide whether to move in.
//!
//! 1. First activation: publish the restriction map (free and tolled
//!    commodities open, banned ones closed) and give every tolled commodity
//!    a live-density logit selector in the general-purpose lane group.  Any
//!    selector already there is kept for restoration and its pokes cancelled.
//! 2. Every later poke: from the hot lane's entries since the last poke,
//!    estimate its speed.  Above the quality-of-service threshold moving in
//!    is free (`add_in = +∞`), otherwise `add_in = toll_coef · toll(flow)`.
//! 3. Expiry: put the original selectors back (re-polling them if they are
//!    polled) and drop the ones this controller installed.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use ctm_core::{ActuatorId, CommodityId, ControllerId, LaneGroupId, LookupTable, ValidationLog};
use ctm_dispatch::{Action, ActionKind, Event, Recipient};
use ctm_flow::{LaneSelector, LogitSelector, Restriction};

use crate::{Actuator, ActuatorKind, Command, ControlContext, ControlError, ControlResult};

#[derive(Clone, Debug)]
pub struct TollConfig {
    pub free:     BTreeSet<CommodityId>,
    pub banned:   BTreeSet<CommodityId>,
    pub tolled:   BTreeSet<CommodityId>,
    pub toll_coef: f64,
    pub qos_speed_threshold_kph: f64,
    /// Toll in cents against flow in veh/h/lane.
    pub vplph_to_cents: LookupTable,
}

#[derive(Clone, Debug)]
pub struct TollLaneGroup {
    pub config: TollConfig,
    lanes:      Vec<TollLane>,
    /// `vplph_to_cents` rescaled to vehicles per lane per poke.
    toll_table: Option<LookupTable>,
    speed_threshold_m_per_dt: f64,
    first_time: bool,
}

#[derive(Clone, Debug)]
struct TollLane {
    hot: LaneGroupId,
    gp:  LaneGroupId,
    ffspeed_m_per_dt: f64,
    prev_count: f64,
    /// Selectors found in `gp` at activation.
    nominal: BTreeMap<CommodityId, LaneSelector>,
}

impl TollLaneGroup {
    pub fn new(config: TollConfig) -> Self {
        Self {
            config,
            lanes: Vec::new(),
            toll_table: None,
            speed_threshold_m_per_dt: 0.0,
            first_time: true,
        }
    }

    /// The utility bonus currently offered for moving into `hot`, if a
    /// toll selector is installed next to it.
    pub fn add_in(&self, ctx: &ControlContext<'_>, hot: LaneGroupId, commodity: CommodityId) -> Option<f64> {
        let lane = self.lanes.iter().find(|l| l.hot == hot)?;
        match ctx.flow.lanegroup(lane.gp).ok()?.lane_selectors.get(&commodity)? {
            LaneSelector::Logit(l) => Some(l.add_in),
            LaneSelector::Keep => None,
        }
    }

    pub(crate) fn validate(
        &self,
        id: ControllerId,
        actuators: &[ActuatorId],
        all_actuators: &[Actuator],
        log: &mut ValidationLog,
    ) {
        match actuators {
            [a] => {
                if let Some(act) = all_actuators.get(a.index()) {
                    if act.kind != ActuatorKind::OpenCloseLaneGroup {
                        log.add_error(format!("{id}: tolling drives an open/close lane group actuator"));
                    }
                }
            }
            _ => log.add_error(format!("{id}: tolling needs exactly one actuator")),
        }
        let c = &self.config;
        if let Some(x) = c.tolled.intersection(&c.banned).next() {
            log.add_error(format!("{id}: {x} is both tolled and banned"));
        }
        if !(c.qos_speed_threshold_kph >= 0.0) {
            log.add_error(format!("{id}: speed threshold must be non-negative"));
        }
    }

    pub(crate) fn initialize(
        &mut self,
        id: ControllerId,
        actuators: &[ActuatorId],
        dt_secs: f64,
        ctx: &ControlContext<'_>,
    ) -> ControlResult<()> {
        let a = *actuators.first().ok_or_else(|| ControlError::Config {
            controller: id,
            reason: "tolling needs an actuator".into(),
        })?;
        let act = ctx.actuators.get(a.index()).ok_or(ControlError::UnknownActuator(a))?;

        self.lanes = act
            .target
            .lanegroups()
            .iter()
            .map(|&hot| {
                let lg = ctx.net.lanegroup(hot)?;
                let gp = lg.neighbor_out.ok_or_else(|| ControlError::Config {
                    controller: id,
                    reason: format!("tolled {hot} has no general-purpose neighbor"),
                })?;
                let fluid = ctx.flow.lanegroup(hot)?;
                Ok(TollLane {
                    hot,
                    gp,
                    ffspeed_m_per_dt: fluid.speed_kph * 1_000.0 / 3_600.0 * dt_secs,
                    prev_count: fluid.entered.total_count(),
                    nominal: BTreeMap::new(),
                })
            })
            .collect::<ControlResult<Vec<_>>>()?;

        let mut table = self.config.vplph_to_cents.clone();
        table.scale_x(dt_secs / 3_600.0);
        self.toll_table = Some(table);
        self.speed_threshold_m_per_dt = self.config.qos_speed_threshold_kph * 1_000.0 / 3_600.0 * dt_secs;
        self.first_time = true;
        Ok(())
    }

    pub(crate) fn update_command(
        &mut self,
        actuators: &[ActuatorId],
        command: &mut BTreeMap<ActuatorId, Command>,
        ctx: &mut ControlContext<'_>,
    ) -> ControlResult<()> {
        if self.first_time {
            let c = &self.config;
            let mut restrictions = BTreeMap::new();
            for &x in c.free.iter().chain(&c.tolled) {
                restrictions.insert(x, Restriction::Open);
            }
            for &x in &c.banned {
                restrictions.insert(x, Restriction::Closed);
            }
            for &a in actuators {
                command.insert(a, Command::Restrictions(restrictions.clone()));
            }
            for lane in &mut self.lanes {
                install(lane, &self.config.tolled, ctx)?;
            }
            self.first_time = false;
            return Ok(());
        }

        for lane in &mut self.lanes {
            let hot = ctx.flow.lanegroup(lane.hot)?;
            let count = hot.entered.total_count();
            let flow_vpdt = count - lane.prev_count;
            lane.prev_count = count;

            let veh = hot.total_vehicles();
            let speed = if veh < 1.0 {
                lane.ffspeed_m_per_dt
            } else {
                (hot.length_m * flow_vpdt / veh).min(lane.ffspeed_m_per_dt)
            };
            let add_in = if speed > self.speed_threshold_m_per_dt {
                f64::INFINITY
            } else {
                let toll = self
                    .toll_table
                    .as_ref()
                    .map_or(0.0, |t| t.value_at(flow_vpdt / hot.num_lanes as f64));
                self.config.toll_coef * toll
            };
            debug!("toll next to {}: speed {speed:.1} m/dt, add_in {add_in}", lane.hot);

            let gp = ctx.flow.lanegroup_mut(lane.gp)?;
            for c in &self.config.tolled {
                if let Some(LaneSelector::Logit(l)) = gp.lane_selectors.get_mut(c) {
                    l.add_in = add_in;
                }
            }
        }
        Ok(())
    }

    /// Undo the selector swap.
    pub(crate) fn restore(&mut self, ctx: &mut ControlContext<'_>) -> ControlResult<()> {
        let now = ctx.dispatcher.current_time();
        for lane in &mut self.lanes {
            for &c in &self.config.tolled {
                let recipient = Recipient::LaneSelector { lanegroup: lane.gp, commodity: c };
                ctx.dispatcher.remove_events_for_recipient(ActionKind::Poke, recipient);
                let gp = ctx.flow.lanegroup_mut(lane.gp)?;
                match lane.nominal.remove(&c) {
                    Some(old) => {
                        let polled = matches!(&old, LaneSelector::Logit(l) if l.dt_secs.is_some());
                        gp.set_lane_selector(c, old);
                        if polled {
                            ctx.dispatcher.register_event(Event::new(
                                now,
                                Action::PokeLaneSelector { lanegroup: lane.gp, commodity: c },
                            ))?;
                        }
                    }
                    None => {
                        gp.lane_selectors.remove(&c);
                    }
                }
            }
        }
        self.first_time = true;
        Ok(())
    }
}

fn install(lane: &mut TollLane, tolled: &BTreeSet<CommodityId>, ctx: &mut ControlContext<'_>) -> ControlResult<()> {
    for &c in tolled {
        let recipient = Recipient::LaneSelector { lanegroup: lane.gp, commodity: c };
        ctx.dispatcher.remove_events_for_recipient(ActionKind::Poke, recipient);

        let gp = ctx.flow.lanegroup_mut(lane.gp)?;
        let toll = match gp.lane_selectors.get(&c) {
            Some(LaneSelector::Logit(old)) => LogitSelector::new(old.keep, old.rho_vehperlane, None),
            _ => LogitSelector::default(),
        };
        if let Some(old) = gp.set_lane_selector(c, LaneSelector::Logit(toll)) {
            lane.nominal.insert(c, old);
        }
    }
    Ok(())
}
