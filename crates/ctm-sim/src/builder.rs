//! Fluent builder for constructing a [`Sim`].

use ctm_control::{Actuator, Controller, FixedSensor};
use log::error;

use ctm_core::{CommodityId, DemandId, Key, LaneGroupId, SimConfig, ValidationLog};
use ctm_demand::DemandSpec;
use ctm_dispatch::Dispatcher;
use ctm_flow::{FlowModel, LaneSelector};
use ctm_network::Network;

use crate::{Sim, SimError, SimResult};

/// Fluent builder for [`Sim`].
///
/// # Required inputs
///
/// - [`SimConfig`]: start time, duration and flow-model step
/// - [`Network`], from [`ctm_network::NetworkBuilder`]
///
/// # Optional inputs
///
/// | Method                  | Default                          |
/// |-------------------------|----------------------------------|
/// | `.demand(s)` / `.demands(v)` | no sources inject anything  |
/// | `.sensor(s)`            | no sensors                       |
/// | `.actuator(a)`          | no actuators                     |
/// | `.controller(c)`        | no controllers                   |
/// | `.lane_selector(..)`    | every commodity keeps its lane   |
/// | `.initial_vehicles(..)` | an empty network                 |
///
/// Sensors, actuators and controllers carry their own ids, which must equal
/// their position in insertion order.  Demands get ids in insertion order.
///
/// Only the step size and id bookkeeping are checked here, since the cell
/// layout depends on the step.  Scenario validation runs in
/// [`Sim::initialize`] so every other problem is reported at once.
///
/// # Example
///
/// ```rust,ignore
/// let mut sim = SimBuilder::new(config, net)
///     .demands(load_demands_csv(path, &net)?)
///     .sensor(FixedSensor::new(SensorId(0), mainline, 30.0))
///     .actuator(Actuator::meter(ActuatorId(0), 0.5, ActuatorTarget::LaneGroup(ramp_lg)))
///     .controller(Controller::new(ControllerId(0), ControllerKind::Alinea(Alinea::new()),
///                                 vec![ActuatorId(0)], vec![SensorId(0)], 30.0))
///     .build()?;
/// sim.run(&mut NoopObserver)?;
/// ```
pub struct SimBuilder {
    config:      SimConfig,
    net:         Network,
    demands:     Vec<DemandSpec>,
    sensors:     Vec<FixedSensor>,
    actuators:   Vec<Actuator>,
    controllers: Vec<Controller>,
    selectors:   Vec<(LaneGroupId, CommodityId, LaneSelector)>,
    vehicles:    Vec<(LaneGroupId, usize, Key, f64)>,
}

impl SimBuilder {
    pub fn new(config: SimConfig, net: Network) -> Self {
        Self {
            config,
            net,
            demands:     Vec::new(),
            sensors:     Vec::new(),
            actuators:   Vec::new(),
            controllers: Vec::new(),
            selectors:   Vec::new(),
            vehicles:    Vec::new(),
        }
    }

    pub fn demand(mut self, spec: DemandSpec) -> Self {
        self.demands.push(spec);
        self
    }

    pub fn demands(mut self, specs: impl IntoIterator<Item = DemandSpec>) -> Self {
        self.demands.extend(specs);
        self
    }

    pub fn sensor(mut self, sensor: FixedSensor) -> Self {
        self.sensors.push(sensor);
        self
    }

    pub fn actuator(mut self, actuator: Actuator) -> Self {
        self.actuators.push(actuator);
        self
    }

    /// Add a controller.  Its actuators are attached to it at `build()`.
    pub fn controller(mut self, controller: Controller) -> Self {
        self.controllers.push(controller);
        self
    }

    /// Lane-change policy of `commodity` in `lanegroup`.  Polled logit
    /// selectors are refreshed on their own period once the sim starts.
    pub fn lane_selector(mut self, lanegroup: LaneGroupId, commodity: CommodityId, selector: LaneSelector) -> Self {
        self.selectors.push((lanegroup, commodity, selector));
        self
    }

    /// Seed `veh` vehicles of `key` into cell `cell` of `lanegroup`.
    pub fn initial_vehicles(mut self, lanegroup: LaneGroupId, cell: usize, key: Key, veh: f64) -> Self {
        self.vehicles.push((lanegroup, cell, key, veh));
        self
    }

    /// Check id bookkeeping, create the flow state, and return a [`Sim`]
    /// ready to be initialized.
    pub fn build(self) -> SimResult<Sim> {
        let mut log = ValidationLog::new();
        self.config.check_step(&mut log);
        if log.has_errors() {
            error!("refusing to build: {log}");
            return Err(SimError::Validation(log));
        }
        if let Some((i, s)) = self.sensors.iter().enumerate().find(|(i, s)| s.id.index() != *i) {
            return Err(SimError::Config(format!("sensor #{i} has id {}", s.id)));
        }
        if let Some((i, a)) = self.actuators.iter().enumerate().find(|(i, a)| a.id.index() != *i) {
            return Err(SimError::Config(format!("actuator #{i} has id {}", a.id)));
        }
        if let Some((i, c)) = self.controllers.iter().enumerate().find(|(i, c)| c.id.index() != *i) {
            return Err(SimError::Config(format!("controller #{i} has id {}", c.id)));
        }

        // ── Attach actuators to their controllers ─────────────────────────
        //
        // First claim wins; a second claim is reported by validation.
        let mut actuators = self.actuators;
        for c in &self.controllers {
            for a in &c.actuators {
                if let Some(act) = actuators.get_mut(a.index()) {
                    act.controller.get_or_insert(c.id);
                }
            }
        }

        // ── Flow state ────────────────────────────────────────────────────
        let mut flow = FlowModel::new(&self.net, self.config.sim_dt_secs);
        for (lg, commodity, selector) in self.selectors {
            flow.lanegroup_mut(lg)?.set_lane_selector(commodity, selector);
        }
        for (lg, cell, key, veh) in self.vehicles {
            flow.set_vehicles(lg, cell, key, veh)?;
        }

        let demands = self
            .demands
            .into_iter()
            .enumerate()
            .map(|(i, spec)| spec.into_generator(DemandId(i as u32)))
            .collect();

        Ok(Sim {
            dispatcher: Dispatcher::new(self.config.start_time()),
            config: self.config,
            net: self.net,
            flow,
            demands,
            sensors: self.sensors,
            actuators,
            controllers: self.controllers,
            initialized: false,
        })
    }
}
