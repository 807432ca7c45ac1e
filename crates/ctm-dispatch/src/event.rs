//! Events and the closed set of actions they carry.

use ctm_core::{CommodityId, ControllerId, DemandId, LaneGroupId, SensorId, SimTime};

/// Default priorities.  Lower fires first among events sharing a timestamp.
///
/// Sensors sample the state left by the previous model update, controllers
/// read those samples, and only then does the next model update run.
pub mod priority {
    pub const DEMAND_CHANGE:      u8 = 0;
    pub const SENSOR_POKE:        u8 = 1;
    pub const CONTROLLER_POKE:    u8 = 2;
    pub const LANE_SELECTOR_POKE: u8 = 3;
    pub const MODEL_UPDATE:       u8 = 4;
}

/// What an event does when fired.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Set a demand generator's injection rate (vehicles per second).
    DemandChange { demand: DemandId, rate_vps: f64 },
    /// Advance the flow model by one step.
    ModelUpdate,
    /// Sample a sensor.
    PokeSensor(SensorId),
    /// Run one controller update.
    PokeController(ControllerId),
    /// Refresh a logit lane selector's cached densities.
    PokeLaneSelector { lanegroup: LaneGroupId, commodity: CommodityId },
}

/// Action type, used to cancel pending events selectively.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    DemandChange,
    ModelUpdate,
    Poke,
}

/// The element an event is addressed to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Recipient {
    Demand(DemandId),
    Model,
    Sensor(SensorId),
    Controller(ControllerId),
    LaneSelector { lanegroup: LaneGroupId, commodity: CommodityId },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::DemandChange { .. } => ActionKind::DemandChange,
            Action::ModelUpdate => ActionKind::ModelUpdate,
            Action::PokeSensor(_)
            | Action::PokeController(_)
            | Action::PokeLaneSelector { .. } => ActionKind::Poke,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match *self {
            Action::DemandChange { demand, .. } => Recipient::Demand(demand),
            Action::ModelUpdate => Recipient::Model,
            Action::PokeSensor(id) => Recipient::Sensor(id),
            Action::PokeController(id) => Recipient::Controller(id),
            Action::PokeLaneSelector { lanegroup, commodity } => {
                Recipient::LaneSelector { lanegroup, commodity }
            }
        }
    }

    pub fn default_priority(&self) -> u8 {
        match self {
            Action::DemandChange { .. } => priority::DEMAND_CHANGE,
            Action::ModelUpdate => priority::MODEL_UPDATE,
            Action::PokeSensor(_) => priority::SENSOR_POKE,
            Action::PokeController(_) => priority::CONTROLLER_POKE,
            Action::PokeLaneSelector { .. } => priority::LANE_SELECTOR_POKE,
        }
    }
}

/// A time-stamped action.  Owned by the dispatcher until fired or cancelled.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub timestamp: SimTime,
    pub priority:  u8,
    pub action:    Action,
}

impl Event {
    /// Event with the action's default priority.
    pub fn new(timestamp: SimTime, action: Action) -> Self {
        let priority = action.default_priority();
        Self { timestamp, priority, action }
    }

    pub fn with_priority(timestamp: SimTime, priority: u8, action: Action) -> Self {
        Self { timestamp, priority, action }
    }
}
