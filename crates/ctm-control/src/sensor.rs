//! `FixedSensor`: a loop detector covering a whole link.

use log::trace;

use ctm_core::{LinkId, SensorId, SimTime, ValidationLog};
use ctm_dispatch::{Action, Dispatcher, Event};
use ctm_flow::FlowModel;
use ctm_network::Network;

use crate::ControlResult;

/// Last sample taken by a sensor.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Measurement {
    pub timestamp: SimTime,
    /// Vehicles on the link.
    pub vehicles:  f64,
    /// Outflow of the link since the previous sample, veh/h.
    pub flow_vph:  f64,
}

#[derive(Clone, Debug)]
pub struct FixedSensor {
    pub id:      SensorId,
    pub link:    LinkId,
    /// Sampling period; `0` samples once at start-up.
    pub dt_secs: f64,
    measurement:    Measurement,
    prev_count:     f64,
    prev_timestamp: Option<SimTime>,
}

impl FixedSensor {
    pub fn new(id: SensorId, link: LinkId, dt_secs: f64) -> Self {
        Self {
            id,
            link,
            dt_secs,
            measurement: Measurement::default(),
            prev_count: 0.0,
            prev_timestamp: None,
        }
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    pub fn validate(&self, net: &Network, log: &mut ValidationLog) {
        if let Err(e) = net.link(self.link) {
            log.add_error(format!("{}: {e}", self.id));
        }
        if !(self.dt_secs >= 0.0) {
            log.add_error(format!("{}: sampling period must be non-negative", self.id));
        }
    }

    /// Forget previous samples and schedule the first poke now.
    pub fn initialize(&mut self, flow: &FlowModel, net: &Network, dispatcher: &mut Dispatcher) -> ControlResult<()> {
        self.measurement = Measurement::default();
        self.prev_count = self.exit_count(flow, net)?;
        self.prev_timestamp = None;
        dispatcher.register_event(Event::new(dispatcher.current_time(), Action::PokeSensor(self.id)))?;
        Ok(())
    }

    /// Sample, then wake up again in `dt_secs`.
    pub fn poke(&mut self, flow: &FlowModel, net: &Network, dispatcher: &mut Dispatcher) -> ControlResult<()> {
        let now = dispatcher.current_time();
        self.take_measurement(flow, net, now)?;
        if self.dt_secs > 0.0 {
            dispatcher.register_event(Event::new(now.offset_secs(self.dt_secs), Action::PokeSensor(self.id)))?;
        }
        Ok(())
    }

    pub fn take_measurement(&mut self, flow: &FlowModel, net: &Network, now: SimTime) -> ControlResult<()> {
        let count = self.exit_count(flow, net)?;
        let flow_vph = match self.prev_timestamp {
            Some(prev) if now > prev => {
                let secs = now.since(prev) as f64 / 1_000.0;
                (count - self.prev_count) * 3_600.0 / secs
            }
            _ => 0.0,
        };
        self.measurement = Measurement {
            timestamp: now,
            vehicles: flow.link_vehicles(net, self.link)?,
            flow_vph,
        };
        self.prev_count = count;
        self.prev_timestamp = Some(now);
        trace!("{} at {now}: {:?}", self.id, self.measurement);
        Ok(())
    }

    fn exit_count(&self, flow: &FlowModel, net: &Network) -> ControlResult<f64> {
        let link = net.link(self.link)?;
        let mut count = 0.0;
        for &lg in &link.lanegroups {
            count += flow.lanegroup(lg)?.exited.total_count();
        }
        Ok(count)
    }
}
