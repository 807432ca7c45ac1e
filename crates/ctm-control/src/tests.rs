//! Unit tests for ctm-control.

#[cfg(test)]
mod helpers {
    use ctm_core::{CommodityId, LaneGroupId, LinkId, RoadConnectionId, SimTime};
    use ctm_dispatch::Dispatcher;
    use ctm_flow::FlowModel;
    use ctm_network::{Network, NetworkBuilder, RoadParams};

    use crate::{Actuator, ControlContext, FixedSensor};

    pub const DT: f64 = 2.0;

    pub fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() <= tol, "{a} != {b} (tol {tol})");
    }

    /// Everything a controller poke borrows.
    pub struct Rig {
        pub net:       Network,
        pub flow:      FlowModel,
        pub sensors:   Vec<FixedSensor>,
        pub actuators: Vec<Actuator>,
        pub disp:      Dispatcher,
    }

    impl Rig {
        pub fn new(net: Network) -> Self {
            let flow = FlowModel::new(&net, DT);
            Self { net, flow, sensors: Vec::new(), actuators: Vec::new(), disp: Dispatcher::new(SimTime::ZERO) }
        }

        pub fn ctx(&mut self) -> ControlContext<'_> {
            ControlContext::new(&self.net, &mut self.flow, &self.sensors, &self.actuators, &mut self.disp)
        }

        pub fn lg(&self, link: LinkId, i: usize) -> LaneGroupId {
            self.net.links[link.index()].lanegroups[i]
        }
    }

    pub struct Merge {
        pub rig:     Rig,
        pub up:      LinkId,
        pub ramp:    LinkId,
        pub ml:      LinkId,
        pub up_rc:   RoadConnectionId,
        pub ramp_rc: RoadConnectionId,
        pub car:     CommodityId,
    }

    /// Two-lane freeway `up` and a one-lane on-ramp merging into the
    /// two-lane, 1 km sink `ml`.  Default road parameters everywhere.
    pub fn merge() -> Merge {
        let mut b = NetworkBuilder::new();
        let (n0, n1, n2, n3) = (b.add_node(), b.add_node(), b.add_node(), b.add_node());
        let up = b.add_link(n0, n1, 500.0, 2, RoadParams::default());
        let ramp = b.add_link(n3, n1, 200.0, 1, RoadParams::default());
        let ml = b.add_link(n1, n2, 1_000.0, 2, RoadParams::default());
        let up_rc = b.connect(up, ml);
        let ramp_rc = b.connect(ramp, ml);
        let car = b.add_commodity("car");
        Merge { rig: Rig::new(b.build().unwrap()), up, ramp, ml, up_rc, ramp_rc, car }
    }

    pub struct Managed {
        pub rig:   Rig,
        pub main:  LinkId,
        pub car:   CommodityId,
        pub truck: CommodityId,
    }

    /// A 1 km source link with an inner one-lane lane group (the managed
    /// lane) and an outer two-lane general-purpose lane group, feeding a sink.
    pub fn managed_lane() -> Managed {
        let mut b = NetworkBuilder::new();
        let (n0, n1, n2) = (b.add_node(), b.add_node(), b.add_node());
        let main = b.add_link_with_lanegroups(n0, n1, 1_000.0, &[1, 2], RoadParams::default());
        let exit = b.add_link(n1, n2, 500.0, 3, RoadParams::default());
        b.connect(main, exit);
        let car = b.add_commodity("car");
        let truck = b.add_commodity("truck");
        Managed { rig: Rig::new(b.build().unwrap()), main, car, truck }
    }
}

// ── Actuators ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod actuator {
    use std::collections::{BTreeMap, BTreeSet};

    use ctm_core::{ActuatorId, ValidationLog};
    use ctm_flow::Restriction;

    use super::helpers::{DT, assert_close, managed_lane, merge};
    use crate::{Actuator, ActuatorKind, ActuatorTarget, Command, ControlError};

    #[test]
    fn meter_rate_split_by_lanes_and_clamped() {
        let mut m = managed_lane();
        let (hot, gp) = (m.rig.lg(m.main, 0), m.rig.lg(m.main, 1));
        let act = Actuator::meter(ActuatorId(0), 0.3, ActuatorTarget::LaneGroups(vec![hot, gp]));

        act.apply(Some(&Command::Rate(0.15)), &m.rig.net, &mut m.rig.flow).unwrap();
        assert_close(m.rig.flow.lanegroup(hot).unwrap().meter_veh_per_step.unwrap(), 0.15 * DT / 3.0, 1e-12);
        assert_close(m.rig.flow.lanegroup(gp).unwrap().meter_veh_per_step.unwrap(), 0.15 * DT * 2.0 / 3.0, 1e-12);

        act.apply(Some(&Command::Rate(10.0)), &m.rig.net, &mut m.rig.flow).unwrap();
        assert_close(m.rig.flow.lanegroup(gp).unwrap().meter_veh_per_step.unwrap(), 0.3 * DT * 2.0 / 3.0, 1e-12);

        act.apply(None, &m.rig.net, &mut m.rig.flow).unwrap();
        assert_eq!(m.rig.flow.lanegroup(hot).unwrap().meter_veh_per_step, None);
    }

    #[test]
    fn restrictions_installed_and_reverted() {
        let mut m = managed_lane();
        let hot = m.rig.lg(m.main, 0);
        let act = Actuator::new(ActuatorId(0), ActuatorKind::OpenCloseLaneGroup, ActuatorTarget::LaneGroup(hot));
        let cmd = Command::Restrictions(BTreeMap::from([(m.truck, Restriction::Closed)]));

        act.apply(Some(&cmd), &m.rig.net, &mut m.rig.flow).unwrap();
        assert!(!m.rig.flow.lanegroup(hot).unwrap().is_open(m.truck));
        assert!(m.rig.flow.lanegroup(hot).unwrap().is_open(m.car));

        act.apply(None, &m.rig.net, &mut m.rig.flow).unwrap();
        assert!(m.rig.flow.lanegroup(hot).unwrap().is_open(m.truck));
    }

    #[test]
    fn signal_reds_everything_not_green() {
        let mut m = merge();
        let node = m.rig.net.links[m.ml.index()].start_node;
        let act = Actuator::new(ActuatorId(0), ActuatorKind::Signal, ActuatorTarget::Node(node));

        let cmd = Command::SignalPhase(BTreeSet::from([m.up_rc]));
        act.apply(Some(&cmd), &m.rig.net, &mut m.rig.flow).unwrap();
        assert_eq!(m.rig.flow.red_connections, BTreeSet::from([m.ramp_rc]));

        act.apply(None, &m.rig.net, &mut m.rig.flow).unwrap();
        assert!(m.rig.flow.red_connections.is_empty());
    }

    #[test]
    fn wrong_command_is_an_error() {
        let mut m = merge();
        let ramp_lg = m.rig.lg(m.ramp, 0);
        let act = Actuator::meter(ActuatorId(3), 1.0, ActuatorTarget::LaneGroup(ramp_lg));
        let err = act
            .apply(Some(&Command::SignalPhase(BTreeSet::new())), &m.rig.net, &mut m.rig.flow)
            .unwrap_err();
        assert!(matches!(err, ControlError::CommandMismatch { command: "signal phase", .. }));
    }

    #[test]
    fn wrong_target_is_an_error_and_a_validation_failure() {
        let mut m = merge();
        let ramp_lg = m.rig.lg(m.ramp, 0);
        let act = Actuator::new(ActuatorId(1), ActuatorKind::Signal, ActuatorTarget::LaneGroup(ramp_lg));
        let err = act.apply(None, &m.rig.net, &mut m.rig.flow).unwrap_err();
        assert!(matches!(err, ControlError::TargetMismatch { .. }));

        let mut log = ValidationLog::new();
        act.validate(&m.rig.net, &mut log);
        assert_eq!(log.len(), 1);
    }
}

// ── Sensors ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod sensor {
    use ctm_core::{Key, SensorId, SimTime};

    use super::helpers::{assert_close, merge};
    use crate::FixedSensor;

    #[test]
    fn samples_link_vehicles_and_repeats() {
        let mut m = merge();
        let ml_lg = m.rig.lg(m.ml, 0);
        m.rig.flow.set_vehicles(ml_lg, 3, Key::next_link(m.car, m.ml), 12.5).unwrap();

        let mut s = FixedSensor::new(SensorId(0), m.ml, 30.0);
        s.initialize(&m.rig.flow, &m.rig.net, &mut m.rig.disp).unwrap();
        m.rig.disp.pop_next().unwrap();
        s.poke(&m.rig.flow, &m.rig.net, &mut m.rig.disp).unwrap();

        assert_close(s.measurement().vehicles, 12.5, 1e-12);
        assert_eq!(s.measurement().flow_vph, 0.0);
        assert_eq!(m.rig.disp.next_time(), Some(SimTime::from_secs(30.0)));
    }
}

// ── ALINEA ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod alinea {
    use ctm_core::{ActuatorId, ControllerId, Key, SensorId, SimTime, ValidationLog};

    use super::helpers::{assert_close, merge, Merge};
    use crate::{
        Actuator, ActuatorTarget, Alinea, Command, Controller, ControllerKind, ControllerState,
        FixedSensor,
    };

    fn rate(c: &Controller) -> f64 {
        match c.command_for(ActuatorId(0)) {
            Some(Command::Rate(r)) => *r,
            other => panic!("unexpected {other:?}"),
        }
    }

    fn set_ml(m: &mut Merge, veh: f64) {
        let lg = m.rig.lg(m.ml, 0);
        m.rig.flow.set_vehicles(lg, 0, Key::next_link(m.car, m.ml), veh).unwrap();
    }

    fn setup(max_rate_vps: f64) -> (Merge, Controller) {
        let mut m = merge();
        let ramp_lg = m.rig.lg(m.ramp, 0);
        m.rig.actuators.push(Actuator::meter(ActuatorId(0), max_rate_vps, ActuatorTarget::LaneGroup(ramp_lg)));
        m.rig.sensors.push(FixedSensor::new(SensorId(0), m.ml, 30.0));
        let c = Controller::new(
            ControllerId(0),
            ControllerKind::Alinea(Alinea::new()),
            vec![ActuatorId(0)],
            vec![SensorId(0)],
            30.0,
        );
        (m, c)
    }

    #[test]
    fn binding_from_link_parameters() {
        let (mut m, mut c) = setup(0.5);
        c.initialize(&mut m.rig.ctx()).unwrap();
        assert_eq!(c.state(), ControllerState::Initialized);
        let ControllerKind::Alinea(a) = &c.kind else { unreachable!() };
        let b = a.binding().unwrap();
        // 100 km/h over 1 km; 18 veh/km/lane · 2 lanes · 1 km
        assert_close(b.gain_per_sec, 1.0 / 36.0, 1e-12);
        assert_close(b.ref_density_veh, 36.0, 1e-9);
        assert_close(rate(&c), 0.5, 0.0);
    }

    #[test]
    fn unbounded_meter_starts_at_900_vphpl() {
        let (mut m, mut c) = setup(f64::INFINITY);
        c.initialize(&mut m.rig.ctx()).unwrap();
        assert_close(rate(&c), 2.0 * 900.0 / 3_600.0, 1e-12);
    }

    #[test]
    fn recurrence_and_clamping() {
        let (mut m, mut c) = setup(0.5);
        c.initialize(&mut m.rig.ctx()).unwrap();

        set_ml(&mut m, 46.0);
        m.rig.disp.pop_next().unwrap();
        c.poke(&mut m.rig.ctx()).unwrap();
        assert_eq!(c.state(), ControllerState::Active);
        assert_close(rate(&c), 0.5 - 10.0 / 36.0, 1e-9);
        assert_eq!(m.rig.disp.next_time(), Some(SimTime::from_secs(30.0)));

        set_ml(&mut m, 30.0);
        m.rig.disp.pop_next().unwrap();
        c.poke(&mut m.rig.ctx()).unwrap();
        assert_close(rate(&c), 0.5 - 4.0 / 36.0, 1e-9);

        set_ml(&mut m, 0.0);
        m.rig.disp.pop_next().unwrap();
        c.poke(&mut m.rig.ctx()).unwrap();
        assert_close(rate(&c), 0.5, 1e-12);

        set_ml(&mut m, 200.0);
        m.rig.disp.pop_next().unwrap();
        c.poke(&mut m.rig.ctx()).unwrap();
        assert_eq!(rate(&c), 0.0);
    }

    #[test]
    fn expiry_clears_the_command() {
        let (mut m, c) = setup(0.5);
        let mut c = c.active_between(SimTime::ZERO, Some(SimTime::from_secs(45.0)));
        c.initialize(&mut m.rig.ctx()).unwrap();
        m.rig.disp.pop_next().unwrap();
        c.poke(&mut m.rig.ctx()).unwrap();

        let next = m.rig.disp.pop_next().unwrap();
        assert_eq!(next.timestamp, SimTime::from_secs(30.0));
        c.poke(&mut m.rig.ctx()).unwrap();

        let last = m.rig.disp.pop_next().unwrap();
        assert_eq!(last.timestamp, SimTime::from_secs(45.0));
        c.poke(&mut m.rig.ctx()).unwrap();
        assert_eq!(c.state(), ControllerState::Expired);
        assert!(c.command().is_empty());
        assert!(m.rig.disp.is_empty());

        // A stray poke after expiry is ignored.
        c.poke(&mut m.rig.ctx()).unwrap();
        assert!(m.rig.disp.is_empty());
    }

    #[test]
    fn late_start_delays_first_poke() {
        let (mut m, c) = setup(0.5);
        let mut c = c.active_between(SimTime::from_secs(600.0), None);
        c.initialize(&mut m.rig.ctx()).unwrap();
        assert_eq!(m.rig.disp.next_time(), Some(SimTime::from_secs(600.0)));
    }

    #[test]
    fn validation_needs_a_sensor() {
        let (m, mut c) = setup(0.5);
        c.sensors.clear();
        let mut log = ValidationLog::new();
        c.validate(&m.rig.net, &m.rig.sensors, &m.rig.actuators, &mut log);
        assert!(log.errors().iter().any(|e| e.contains("sensor")), "{log}");
    }

    #[test]
    fn poke_before_initialize_is_an_error() {
        let (mut m, mut c) = setup(0.5);
        assert!(c.poke(&mut m.rig.ctx()).is_err());
    }
}

// ── Profile-driven metering ───────────────────────────────────────────────────

#[cfg(test)]
mod profile_rate {
    use std::collections::BTreeMap;

    use ctm_core::{ActuatorId, ControllerId, Profile1D, SimTime};

    use super::helpers::{assert_close, merge};
    use crate::{Actuator, ActuatorTarget, Command, Controller, ControllerKind, ProfileRate};

    #[test]
    fn rate_follows_profile() {
        let mut m = merge();
        let ramp_lg = m.rig.lg(m.ramp, 0);
        m.rig.actuators.push(Actuator::meter(ActuatorId(0), 1.0, ActuatorTarget::LaneGroup(ramp_lg)));
        let profile = Profile1D::new(0.0, 60.0, vec![720.0, 360.0]);
        let kind = ControllerKind::ProfileRate(ProfileRate::new(BTreeMap::from([(ActuatorId(0), profile)])));
        let mut c = Controller::new(ControllerId(0), kind, vec![ActuatorId(0)], vec![], 60.0);
        c.initialize(&mut m.rig.ctx()).unwrap();

        m.rig.disp.pop_next().unwrap();
        c.poke(&mut m.rig.ctx()).unwrap();
        assert_eq!(c.command_for(ActuatorId(0)), Some(&Command::Rate(0.2)));

        let ev = m.rig.disp.pop_next().unwrap();
        assert_eq!(ev.timestamp, SimTime::from_secs(60.0));
        c.poke(&mut m.rig.ctx()).unwrap();
        match c.command_for(ActuatorId(0)) {
            Some(Command::Rate(r)) => assert_close(*r, 0.1, 1e-12),
            other => panic!("unexpected {other:?}"),
        }
    }
}

// ── Fixed-time signal ─────────────────────────────────────────────────────────

#[cfg(test)]
mod signal {
    use std::collections::BTreeSet;

    use ctm_core::{ActuatorId, ControllerId, SimTime, ValidationLog};

    use super::helpers::merge;
    use crate::{
        Actuator, ActuatorKind, ActuatorTarget, Command, Controller, ControllerKind,
        FixedTimeSignal, SignalStage,
    };

    fn plan(a: ctm_core::RoadConnectionId, b: ctm_core::RoadConnectionId) -> FixedTimeSignal {
        FixedTimeSignal::new(0.0, vec![
            SignalStage { duration_secs: 30.0, green: BTreeSet::from([a]) },
            SignalStage { duration_secs: 20.0, green: BTreeSet::from([b]) },
        ])
    }

    #[test]
    fn stage_lookup_wraps_the_cycle() {
        let m = merge();
        let p = plan(m.up_rc, m.ramp_rc);
        let s = SimTime::from_secs;
        assert_eq!(p.cycle_secs(), 50.0);
        assert_eq!(p.stage_at(s(0.0)), Some((0, s(30.0))));
        assert_eq!(p.stage_at(s(35.0)), Some((1, s(50.0))));
        assert_eq!(p.stage_at(s(50.0)), Some((0, s(80.0))));
        assert_eq!(p.stage_at(s(129.0)), Some((0, s(130.0))));
        assert_eq!(p.stage_at(s(135.0)), Some((1, s(150.0))));

        let shifted = FixedTimeSignal { offset_secs: 10.0, ..p };
        assert_eq!(shifted.stage_at(s(5.0)), Some((1, s(10.0))));
    }

    #[test]
    fn pokes_at_stage_changes() {
        let mut m = merge();
        let node = m.rig.net.links[m.ml.index()].start_node;
        m.rig.actuators.push(Actuator::new(ActuatorId(0), ActuatorKind::Signal, ActuatorTarget::Node(node)));
        let kind = ControllerKind::FixedTimeSignal(plan(m.up_rc, m.ramp_rc));
        let mut c = Controller::new(ControllerId(0), kind, vec![ActuatorId(0)], vec![], 0.0);

        let mut log = ValidationLog::new();
        c.validate(&m.rig.net, &m.rig.sensors, &m.rig.actuators, &mut log);
        assert!(log.is_empty(), "{log}");

        c.initialize(&mut m.rig.ctx()).unwrap();
        m.rig.disp.pop_next().unwrap();
        c.poke(&mut m.rig.ctx()).unwrap();
        assert_eq!(c.command_for(ActuatorId(0)), Some(&Command::SignalPhase(BTreeSet::from([m.up_rc]))));

        let ev = m.rig.disp.pop_next().unwrap();
        assert_eq!(ev.timestamp, SimTime::from_secs(30.0));
        c.poke(&mut m.rig.ctx()).unwrap();
        assert_eq!(c.command_for(ActuatorId(0)), Some(&Command::SignalPhase(BTreeSet::from([m.ramp_rc]))));
        assert_eq!(m.rig.disp.next_time(), Some(SimTime::from_secs(50.0)));
    }

    #[test]
    fn green_connection_must_cross_the_node() {
        let mut m = merge();
        let node = m.rig.net.links[m.up.index()].start_node;
        m.rig.actuators.push(Actuator::new(ActuatorId(0), ActuatorKind::Signal, ActuatorTarget::Node(node)));
        let kind = ControllerKind::FixedTimeSignal(plan(m.up_rc, m.ramp_rc));
        let c = Controller::new(ControllerId(0), kind, vec![ActuatorId(0)], vec![], 0.0);
        let mut log = ValidationLog::new();
        c.validate(&m.rig.net, &m.rig.sensors, &m.rig.actuators, &mut log);
        assert_eq!(log.len(), 2);
    }
}

// ── Lane-group tolling ────────────────────────────────────────────────────────

#[cfg(test)]
mod toll {
    use std::collections::{BTreeMap, BTreeSet};

    use ctm_core::{ActuatorId, ControllerId, Key, LookupTable, SimTime};
    use ctm_dispatch::{Action, Event, Recipient};
    use ctm_flow::{LaneSelector, LogitSelector, Restriction};

    use super::helpers::{Managed, managed_lane};
    use crate::{
        Actuator, ActuatorKind, ActuatorTarget, Command, Controller, ControllerKind,
        ControllerState, TollConfig, TollLaneGroup,
    };

    fn setup() -> (Managed, Controller) {
        let mut m = managed_lane();
        let hot = m.rig.lg(m.main, 0);
        m.rig.actuators.push(Actuator::new(ActuatorId(0), ActuatorKind::OpenCloseLaneGroup, ActuatorTarget::LaneGroup(hot)));
        let config = TollConfig {
            free: BTreeSet::new(),
            banned: BTreeSet::from([m.truck]),
            tolled: BTreeSet::from([m.car]),
            toll_coef: 2.0,
            qos_speed_threshold_kph: 45.0,
            vplph_to_cents: LookupTable::new(vec![(0.0, 50.0), (1_800.0, 300.0)]),
        };
        let c = Controller::new(
            ControllerId(0),
            ControllerKind::TollLaneGroup(TollLaneGroup::new(config)),
            vec![ActuatorId(0)],
            vec![],
            60.0,
        )
        .active_between(SimTime::ZERO, Some(SimTime::from_secs(150.0)));
        (m, c)
    }

    fn gp_selector(m: &Managed) -> LaneSelector {
        let gp = m.rig.lg(m.main, 1);
        m.rig.flow.lanegroup(gp).unwrap().lane_selector(m.car).clone()
    }

    fn add_in(m: &Managed) -> f64 {
        match gp_selector(m) {
            LaneSelector::Logit(l) => l.add_in,
            LaneSelector::Keep => panic!("no toll selector"),
        }
    }

    #[test]
    fn full_lifecycle_restores_nominal_selector() {
        let (mut m, mut c) = setup();
        let gp = m.rig.lg(m.main, 1);
        let recipient = Recipient::LaneSelector { lanegroup: gp, commodity: m.car };

        // A polled selector is already in place with its poke pending.
        let nominal = LaneSelector::Logit(LogitSelector::new(0.5, 0.01, Some(10.0)));
        m.rig.flow.lanegroup_mut(gp).unwrap().set_lane_selector(m.car, nominal.clone());
        m.rig
            .disp
            .register_event(Event::new(SimTime::ZERO, Action::PokeLaneSelector { lanegroup: gp, commodity: m.car }))
            .unwrap();

        c.initialize(&mut m.rig.ctx()).unwrap();

        // t = 0: restrictions published, toll selector swapped in.
        let ev = m.rig.disp.pop_next().unwrap();
        assert!(matches!(ev.action, Action::PokeController(_)));
        c.poke(&mut m.rig.ctx()).unwrap();
        let expected = BTreeMap::from([(m.car, Restriction::Open), (m.truck, Restriction::Closed)]);
        assert_eq!(c.command_for(ActuatorId(0)), Some(&Command::Restrictions(expected)));
        match gp_selector(&m) {
            LaneSelector::Logit(l) => {
                assert_eq!((l.keep, l.rho_vehperlane, l.dt_secs), (0.5, 0.01, None));
            }
            LaneSelector::Keep => panic!("toll selector not installed"),
        }
        assert_eq!(m.rig.disp.pending_for(recipient).count(), 0);

        // t = 60: empty managed lane runs at free-flow speed.
        m.rig.disp.pop_next().unwrap();
        c.poke(&mut m.rig.ctx()).unwrap();
        assert_eq!(add_in(&m), f64::INFINITY);

        // t = 120: stalled managed lane, no entries, so toll(0) applies.
        let hot = m.rig.lg(m.main, 0);
        m.rig.flow.set_vehicles(hot, 0, Key::next_link(m.car, m.main), 10.0).unwrap();
        m.rig.disp.pop_next().unwrap();
        c.poke(&mut m.rig.ctx()).unwrap();
        assert_eq!(add_in(&m), 2.0 * 50.0);

        // t = 150: expiry.
        let ev = m.rig.disp.pop_next().unwrap();
        assert_eq!(ev.timestamp, SimTime::from_secs(150.0));
        c.poke(&mut m.rig.ctx()).unwrap();
        assert_eq!(c.state(), ControllerState::Expired);
        assert!(c.command().is_empty());
        assert_eq!(gp_selector(&m), nominal);
        assert_eq!(m.rig.disp.pending_for(recipient).count(), 1);
    }

    #[test]
    fn installed_selector_is_removed_when_none_was_there() {
        let (mut m, mut c) = setup();
        c.initialize(&mut m.rig.ctx()).unwrap();
        while m.rig.disp.pop_next().is_some() {
            c.poke(&mut m.rig.ctx()).unwrap();
        }
        assert_eq!(gp_selector(&m), LaneSelector::Keep);
    }
}
