//! ramp_metering — ALINEA on a freeway merge.
//!
//! Runs the same peak hour twice over the corridor in [`network`]: once
//! with the on-ramp uncontrolled and once with an ALINEA meter fed by a
//! mainline sensor.  Prints a five-minute trace of each run and a short
//! comparison at the end.
//!
//! Set `RUST_LOG=debug` to watch demand changes and controller commands.

mod network;

use std::io::Cursor;

use anyhow::{Result, anyhow};
use log::info;

use ctm_control::{Actuator, ActuatorTarget, Alinea, Controller, ControllerKind, FixedSensor};
use ctm_core::{ActuatorId, ControllerId, LaneGroupId, SensorId, SimConfig, SimTime};
use ctm_demand::load_demands_reader;
use ctm_flow::{FlowModel, StepReport};
use ctm_sim::{SimBuilder, SimObserver};

use network::{Corridor, build_corridor};

// ── Constants ─────────────────────────────────────────────────────────────────

const SIM_DT_SECS:       f64 = 2.0;
const DURATION_SECS:     f64 = 3_600.0;
const REPORT_EVERY_SECS: f64 = 300.0;
const CONTROL_DT_SECS:   f64 = 30.0;
/// Meter ceiling: 1200 veh/h.
const METER_MAX_VPS:     f64 = 1_200.0 / 3_600.0;

// ── Demand CSV ────────────────────────────────────────────────────────────────

// Fifteen-minute profiles in veh/h.  Link 0 = up, link 1 = ramp; commodity 0 = car.
const DEMAND_CSV: &str = "\
link_id,commodity_id,path_id,start_time,dt,values\n\
0,0,,0,900,\"3000,4200,4200,2400\"\n\
1,0,,0,900,\"600,900,900,400\"\n\
";

// ── Observer ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct RunStats {
    max_ml_veh:    f64,
    max_queue_veh: f64,
    vehicle_secs:  f64,
}

/// Prints a line every `REPORT_EVERY_SECS` and keeps running maxima.
struct CorridorTrace {
    ml:    Vec<LaneGroupId>,
    ramp:  Vec<LaneGroupId>,
    stats: RunStats,
}

impl CorridorTrace {
    fn new(c: &Corridor) -> Self {
        let lanegroups = |link: ctm_core::LinkId| c.net.links[link.index()].lanegroups.clone();
        Self { ml: lanegroups(c.ml), ramp: lanegroups(c.ramp), stats: RunStats::default() }
    }

    fn vehicles(flow: &FlowModel, lanegroups: &[LaneGroupId]) -> f64 {
        lanegroups.iter().map(|lg| flow.lanegroups[lg.index()].total_vehicles()).sum()
    }
}

impl SimObserver for CorridorTrace {
    fn on_step_end(&mut self, time: SimTime, report: &StepReport, flow: &FlowModel) {
        let ml = Self::vehicles(flow, &self.ml);
        let queue = Self::vehicles(flow, &self.ramp);
        self.stats.max_ml_veh = self.stats.max_ml_veh.max(ml);
        self.stats.max_queue_veh = self.stats.max_queue_veh.max(queue);
        self.stats.vehicle_secs += report.total_veh * SIM_DT_SECS;

        if time.0 % SimTime::from_secs(REPORT_EVERY_SECS).0 == 0 {
            let meter = self.ramp.iter().filter_map(|lg| flow.lanegroups[lg.index()].meter_veh_per_step).sum::<f64>();
            println!(
                "  {time}  ml {ml:>7.1} veh  ramp {queue:>6.1} veh  meter {:>6.0} veh/h  on network {:>7.1}",
                meter * 3_600.0 / SIM_DT_SECS,
                report.total_veh
            );
        }
    }

    fn on_sim_end(&mut self, end: SimTime, flow: &FlowModel) {
        println!(
            "  done at {end}: {:.0} veh in, {:.0} veh out, {:.1} still on the network",
            flow.injected_total(),
            flow.exited_total(),
            flow.total_vehicles()
        );
    }
}

// ── Runs ──────────────────────────────────────────────────────────────────────

fn run(metered: bool) -> Result<RunStats> {
    let c = build_corridor().map_err(|log| anyhow!("invalid corridor:\n{log}"))?;
    let demands = load_demands_reader(Cursor::new(DEMAND_CSV), &c.net)?;
    info!(
        "corridor {} → {} → {} with on-ramp {}, {} demand profiles",
        c.up, c.ml, c.down, c.ramp, demands.len()
    );

    let config = SimConfig {
        start_time_secs: 0.0,
        duration_secs:   DURATION_SECS,
        sim_dt_secs:     SIM_DT_SECS,
    };
    let mut builder = SimBuilder::new(config, c.net.clone()).demands(demands);
    if metered {
        let ramp_lg = c.net.links[c.ramp.index()].lanegroups[0];
        builder = builder
            .sensor(FixedSensor::new(SensorId(0), c.ml, CONTROL_DT_SECS))
            .actuator(Actuator::meter(ActuatorId(0), METER_MAX_VPS, ActuatorTarget::LaneGroup(ramp_lg)))
            .controller(Controller::new(
                ControllerId(0),
                ControllerKind::Alinea(Alinea::new()),
                vec![ActuatorId(0)],
                vec![SensorId(0)],
                CONTROL_DT_SECS,
            ));
    }
    let mut sim = builder.build()?;

    let mut trace = CorridorTrace::new(&c);
    sim.run(&mut trace)?;
    Ok(trace.stats)
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== ramp_metering — CTM freeway merge ===");
    println!("Horizon: {DURATION_SECS} s  |  Step: {SIM_DT_SECS} s  |  Control period: {CONTROL_DT_SECS} s");
    println!();

    println!("No control:");
    let open = run(false)?;
    println!();
    println!("ALINEA:");
    let alinea = run(true)?;
    println!();

    println!("{:<12} {:>14} {:>14} {:>16}", "", "max ml veh", "max ramp veh", "total veh·h");
    for (name, s) in [("no control", &open), ("ALINEA", &alinea)] {
        println!(
            "{name:<12} {:>14.1} {:>14.1} {:>16.1}",
            s.max_ml_veh,
            s.max_queue_veh,
            s.vehicle_secs / 3_600.0
        );
    }
    Ok(())
}
