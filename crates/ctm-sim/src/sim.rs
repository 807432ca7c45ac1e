//! The `Sim` struct and its event loop.

use log::{error, info};

use ctm_control::{Actuator, ControlContext, Controller, FixedSensor};
use ctm_core::{CommodityId, DemandId, PathId, Profile1D, SimConfig, SimTime, ValidationLog};
use ctm_demand::{DemandGenerator, DemandSpec};
use ctm_dispatch::{Action, ActionKind, Dispatcher, Event, Recipient};
use ctm_flow::{FlowModel, Injections, LaneSelector};
use ctm_network::Network;

use crate::{SimError, SimObserver, SimResult};

// ── Sim ───────────────────────────────────────────────────────────────────────

/// A CTM scenario and the clock that drives it.
///
/// Everything that happens is an event in the [`Dispatcher`].  Events at the
/// same timestamp fire in priority order, so within one instant:
///
/// 1. **Demand changes** set source injection rates.
/// 2. **Sensor pokes** sample link state.
/// 3. **Controller pokes** read sensors and links and publish commands.
/// 4. **Lane-selector pokes** refresh cached densities of polled logit
///    selectors.
/// 5. **Model update**: every actuator applies its controller's command,
///    sources inject, the flow model advances one step, observers see the
///    result, and the next update is scheduled `sim_dt` later.
///
/// Create via [`SimBuilder`][crate::SimBuilder].
pub struct Sim {
    /// Start time, duration, and flow-model step.
    pub config: SimConfig,

    /// Event queue and simulation clock.
    pub dispatcher: Dispatcher,

    /// Immutable topology.
    pub net: Network,

    /// Cell state of every lane group.
    pub flow: FlowModel,

    /// Sources, indexed by `DemandId`.
    pub demands: Vec<DemandGenerator>,

    /// Indexed by `SensorId`.
    pub sensors: Vec<FixedSensor>,

    /// Indexed by `ActuatorId`.
    pub actuators: Vec<Actuator>,

    /// Indexed by `ControllerId`.
    pub controllers: Vec<Controller>,

    pub(crate) initialized: bool,
}

impl Sim {
    // ── Public API ────────────────────────────────────────────────────────

    pub fn current_time(&self) -> SimTime {
        self.dispatcher.current_time()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Check the whole scenario and report every problem at once.
    pub fn validate(&self) -> SimResult<()> {
        let mut log = ValidationLog::new();
        let c = &self.config;
        if !(c.duration_secs >= 0.0) {
            log.add_error(format!("duration must be non-negative, got {}", c.duration_secs));
        }
        c.check_step(&mut log);
        if !(c.start_time_secs >= 0.0) {
            log.add_error(format!("start time must be non-negative, got {}", c.start_time_secs));
        }
        self.flow.validate(&mut log);
        for d in &self.demands {
            d.validate(&self.net, &mut log);
        }
        for s in &self.sensors {
            s.validate(&self.net, &mut log);
        }
        for a in &self.actuators {
            a.validate(&self.net, &mut log);
        }
        for ctrl in &self.controllers {
            ctrl.validate(&self.net, &self.sensors, &self.actuators, &mut log);
        }
        if log.has_errors() {
            error!("scenario has {} validation error(s)", log.len());
            return Err(SimError::Validation(log));
        }
        Ok(())
    }

    /// Validate, reset the clock to the start time, and schedule the first
    /// event of every element.  The flow state is left as it is.
    pub fn initialize(&mut self) -> SimResult<()> {
        self.validate()?;
        let start = self.config.start_time();
        self.dispatcher.reset(start);

        for d in &mut self.demands {
            d.clear();
            d.register_initial_change(&mut self.dispatcher)?;
        }
        for s in &mut self.sensors {
            s.initialize(&self.flow, &self.net, &mut self.dispatcher)?;
        }
        for c in &mut self.controllers {
            let mut ctx = ControlContext::new(
                &self.net,
                &mut self.flow,
                &self.sensors,
                &self.actuators,
                &mut self.dispatcher,
            );
            c.initialize(&mut ctx)?;
        }
        for lg in &self.flow.lanegroups {
            for (&commodity, selector) in &lg.lane_selectors {
                if matches!(selector, LaneSelector::Logit(l) if l.dt_secs.is_some()) {
                    self.dispatcher.register_event(Event::new(
                        start,
                        Action::PokeLaneSelector { lanegroup: lg.id, commodity },
                    ))?;
                }
            }
        }
        self.dispatcher.register_event(Event::new(start, Action::ModelUpdate))?;

        self.initialized = true;
        info!(
            "initialized at {start}: {} links, {} lane groups, {} demands, {} controllers",
            self.net.link_count(),
            self.net.lanegroup_count(),
            self.demands.len(),
            self.controllers.len()
        );
        Ok(())
    }

    /// Run from the current time to `config.end_time()`, initializing first
    /// if needed.
    ///
    /// Calls observer hooks after every flow-model step.  Use
    /// [`NoopObserver`][crate::NoopObserver] if you don't need callbacks.
    pub fn run<O: SimObserver>(&mut self, observer: &mut O) -> SimResult<()> {
        let end = self.config.end_time();
        self.run_until(end, observer)?;
        observer.on_sim_end(end, &self.flow);
        info!("finished at {end}: {:.2} vehicles on the network", self.flow.total_vehicles());
        Ok(())
    }

    /// Fire every event before `horizon`, initializing first if needed.
    /// Returns the number of events fired.
    ///
    /// The clock ends at `horizon`, which may lie past `config.end_time()`.
    pub fn run_until<O: SimObserver>(&mut self, horizon: SimTime, observer: &mut O) -> SimResult<u64> {
        if !self.initialized {
            self.initialize()?;
        }
        let Sim { config, dispatcher, net, flow, demands, sensors, actuators, controllers, .. } = self;
        let mut parts = Parts {
            dt_secs: config.sim_dt_secs,
            net,
            flow,
            demands,
            sensors,
            actuators,
            controllers,
        };
        dispatcher.dispatch_until(horizon, |d, event| parts.fire(d, event, observer))
    }

    /// Run `secs` seconds past the current time.
    pub fn run_for<O: SimObserver>(&mut self, secs: f64, observer: &mut O) -> SimResult<u64> {
        let horizon = self.current_time().offset_secs(secs);
        self.run_until(horizon, observer)
    }

    // ── Demand editing ────────────────────────────────────────────────────

    /// Remove every demand and cancel their pending rate changes.
    pub fn clear_all_demands(&mut self) {
        let cancelled = self.dispatcher.remove_events_of_kind(ActionKind::DemandChange);
        self.demands.clear();
        info!(
            "cleared all demands at {} ({cancelled} pending change(s) cancelled)",
            self.current_time()
        );
    }

    /// Add a demand, replacing any existing one with the same link,
    /// commodity and path.  A replaced demand keeps its id and loses its
    /// pending rate changes.  Once the sim is initialized the new profile
    /// takes effect at the current time.
    pub fn set_demand(&mut self, spec: DemandSpec) -> SimResult<DemandId> {
        let existing = self
            .demands
            .iter()
            .position(|d| d.link == spec.link && d.commodity == spec.commodity && d.path == spec.path);
        let id = match existing {
            Some(i) => self.demands[i].id,
            None => DemandId(self.demands.len() as u32),
        };

        let generator = spec.into_generator(id);
        let mut log = ValidationLog::new();
        generator.validate(&self.net, &mut log);
        if log.has_errors() {
            return Err(SimError::Validation(log));
        }

        if self.initialized {
            self.dispatcher.remove_events_for_recipient(ActionKind::DemandChange, Recipient::Demand(id));
            generator.register_initial_change(&mut self.dispatcher)?;
        }
        match existing {
            Some(i) => self.demands[i] = generator,
            None => self.demands.push(generator),
        }
        Ok(id)
    }

    /// Set a demand on the first link of `path` from a veh/h profile.
    pub fn set_demand_on_path_vph(
        &mut self,
        path: PathId,
        commodity: CommodityId,
        profile: Profile1D,
    ) -> SimResult<DemandId> {
        let link = *self
            .net
            .path(path)?
            .links
            .first()
            .ok_or_else(|| SimError::Config(format!("{path} has no links")))?;
        self.set_demand(DemandSpec { link, commodity, path: Some(path), profile })
    }
}

// ── Event handlers ────────────────────────────────────────────────────────────

/// The mutable state event handlers need, borrowed apart from the
/// dispatcher that is driving them.
struct Parts<'s> {
    dt_secs:     f64,
    net:         &'s Network,
    flow:        &'s mut FlowModel,
    demands:     &'s mut [DemandGenerator],
    sensors:     &'s mut [FixedSensor],
    actuators:   &'s [Actuator],
    controllers: &'s mut [Controller],
}

impl Parts<'_> {
    fn fire<O: SimObserver>(&mut self, disp: &mut Dispatcher, event: Event, observer: &mut O) -> SimResult<()> {
        let now = event.timestamp;
        match event.action {
            Action::DemandChange { demand, rate_vps } => {
                let d = self
                    .demands
                    .get_mut(demand.index())
                    .ok_or(SimError::UnknownDemand(demand))?;
                d.set_demand_vps(rate_vps, self.dt_secs, self.net)?;
                d.register_next_change(disp, now)?;
            }
            Action::ModelUpdate => self.model_update(disp, now, observer)?,
            Action::PokeSensor(id) => {
                self.sensors
                    .get_mut(id.index())
                    .ok_or(SimError::UnknownSensor(id))?
                    .poke(self.flow, self.net, disp)?;
            }
            Action::PokeController(id) => {
                let c = self
                    .controllers
                    .get_mut(id.index())
                    .ok_or(SimError::UnknownController(id))?;
                let mut ctx = ControlContext::new(self.net, self.flow, self.sensors, self.actuators, disp);
                c.poke(&mut ctx)?;
            }
            Action::PokeLaneSelector { lanegroup, commodity } => {
                if let Some(dt) = self.flow.refresh_lane_selector(self.net, lanegroup, commodity)? {
                    if dt > 0.0 {
                        disp.register_event(Event::new(
                            now.offset_secs(dt),
                            Action::PokeLaneSelector { lanegroup, commodity },
                        ))?;
                    }
                }
            }
        }
        Ok(())
    }

    fn model_update<O: SimObserver>(&mut self, disp: &mut Dispatcher, now: SimTime, observer: &mut O) -> SimResult<()> {
        // ── Actuators read their controller's latest command ──────────────
        for a in self.actuators {
            let command = a
                .controller
                .and_then(|c| self.controllers.get(c.index()))
                .and_then(|c| c.command_for(a.id));
            a.apply(command, self.net, self.flow)?;
        }

        // ── Sources ───────────────────────────────────────────────────────
        let mut injections = Injections::new();
        for d in self.demands.iter() {
            for (&lg, flows) in d.source_flows() {
                let into = injections.entry(lg).or_default();
                for (&key, &veh) in flows {
                    *into.entry(key).or_insert(0.0) += veh;
                }
            }
        }

        let report = self.flow.update(self.net, &injections)?;
        let next = now.offset_secs(self.dt_secs);
        observer.on_step_end(next, &report, self.flow);
        disp.register_event(Event::new(next, Action::ModelUpdate))?;
        Ok(())
    }
}
