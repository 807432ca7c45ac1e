//! The simulation state a controller works against during one poke.

use ctm_dispatch::Dispatcher;
use ctm_flow::FlowModel;
use ctm_network::Network;

use crate::{Actuator, FixedSensor};

/// Borrowed view of everything outside the controller itself.
///
/// Built by the simulation for each controller poke.  Controllers read
/// sensors and link state through it, and the lane-group tolling controller
/// swaps lane selectors in `flow` and cancels or schedules their pokes on
/// `dispatcher`.  Actuator settings are never written here: controllers only
/// publish commands, which actuators read at the next model update.
pub struct ControlContext<'a> {
    pub net:        &'a Network,
    pub flow:       &'a mut FlowModel,
    pub sensors:    &'a [FixedSensor],
    pub actuators:  &'a [Actuator],
    pub dispatcher: &'a mut Dispatcher,
}

impl<'a> ControlContext<'a> {
    pub fn new(
        net:        &'a Network,
        flow:       &'a mut FlowModel,
        sensors:    &'a [FixedSensor],
        actuators:  &'a [Actuator],
        dispatcher: &'a mut Dispatcher,
    ) -> Self {
        Self { net, flow, sensors, actuators, dispatcher }
    }
}
