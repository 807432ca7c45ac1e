//! `Cell`: one spatial segment of a lane group.
//!
//! A cell's vehicles are split three ways, each partition a `Key → veh` map:
//!
//! ```text
//! veh_dwn   already in a lane group that reaches where they are going
//! veh_out   waiting to change into the outer neighbor lane group
//! veh_in    waiting to change into the inner neighbor lane group
//! ```
//!
//! Every step the cell computes its demand (what it would like to send
//! downstream) and its supply (what it can accept), then applies the
//! inflows and outflows the lane-group / node resolution decided on.
//!
//! All quantities are in vehicles per simulation step, and speeds are
//! normalized to cells per step.

use rustc_hash::FxHashMap;

use ctm_core::{CommodityId, EPSILON, Key, ValidationLog};
use ctm_network::{ModelType, RoadParams};

pub type KeyFlows = FxHashMap<Key, f64>;

/// Slack on the CFL bound for cell lengths that divide a link exactly.
pub const CFL_TOL: f64 = 1e-9;

#[derive(Clone, Debug, Default)]
pub struct Cell {
    pub model_type: ModelType,
    pub is_source:  bool,
    pub is_sink:    bool,
    pub am_upstrm:  bool,
    pub am_dnstrm:  bool,

    // ── Road parameters (per step, all lanes of the lane group) ───────────
    pub capacity_veh:    f64,
    pub jam_density_veh: f64,
    pub ffspeed_norm:    f64,
    pub wspeed_norm:     f64,

    // ── State ─────────────────────────────────────────────────────────────
    pub veh_dwn:    KeyFlows,
    pub demand_dwn: KeyFlows,
    pub veh_out:    KeyFlows,
    pub demand_out: KeyFlows,
    pub veh_in:     KeyFlows,
    pub demand_in:  KeyFlows,
    pub total_vehs_dwn: f64,
    pub total_vehs_out: f64,
    pub total_vehs_in:  f64,

    pub supply: f64,
}

impl Cell {
    pub fn new(model_type: ModelType, is_source: bool, is_sink: bool) -> Self {
        Self { model_type, is_source, is_sink, ..Self::default() }
    }

    /// Convert link road parameters to per-step cell quantities.
    pub fn set_road_params(&mut self, params: &RoadParams, lanes: u32, cell_length_m: f64, dt_secs: f64) {
        let lanes = lanes as f64;
        let cell_length_km = cell_length_m / 1_000.0;
        self.capacity_veh = params.capacity_vphpl * lanes * dt_secs / 3_600.0;
        self.ffspeed_norm = params.speed_kph * dt_secs / 3_600.0 / cell_length_km;
        self.jam_density_veh = params.jam_density_vpkpl * lanes * cell_length_km;
        let critical_veh = self.capacity_veh / self.ffspeed_norm;
        self.wspeed_norm = self.capacity_veh / (self.jam_density_veh - critical_veh);
    }

    /// Record non-negativity and CFL violations.  Source cells hold a
    /// vertical queue and are exempt.
    pub fn validate(&self, what: &str, log: &mut ValidationLog) {
        if self.is_source {
            return;
        }
        for (name, v) in [
            ("ffspeed_norm", self.ffspeed_norm),
            ("jam_density_veh", self.jam_density_veh),
            ("wspeed_norm", self.wspeed_norm),
        ] {
            if v < 0.0 || v.is_nan() {
                log.add_error(format!("{what}: {name} = {v} must be non-negative"));
            }
        }
        if self.wspeed_norm > 1.0 + CFL_TOL {
            log.add_error(format!("{what}: CFL violated, wspeed_norm = {}", self.wspeed_norm));
        }
        if self.ffspeed_norm > 1.0 + CFL_TOL {
            log.add_error(format!("{what}: CFL violated, ffspeed_norm = {}", self.ffspeed_norm));
        }
    }

    // ── Read accessors ────────────────────────────────────────────────────

    #[inline]
    pub fn get_vehicles(&self) -> f64 {
        self.total_vehs_dwn + self.total_vehs_out + self.total_vehs_in
    }

    /// Vehicles of `commodity` in the downstream partition, or every vehicle
    /// in the cell when `commodity` is `None`.
    pub fn get_veh_dwn_for_commodity(&self, commodity: Option<CommodityId>) -> f64 {
        match commodity {
            None => self.get_vehicles(),
            Some(c) => self
                .veh_dwn
                .iter()
                .filter(|(k, _)| k.commodity == c)
                .map(|(_, v)| v)
                .sum(),
        }
    }

    pub fn total_demand(&self) -> f64 {
        [&self.demand_dwn, &self.demand_out, &self.demand_in]
            .into_iter()
            .flat_map(|m| m.values())
            .sum()
    }

    pub fn lateral_vehicles(&self) -> f64 {
        self.total_vehs_out + self.total_vehs_in
    }

    /// Physical room left before jam.  Used to admit lane changers.
    pub fn room(&self) -> f64 {
        match self.model_type {
            ModelType::ManyToOne => f64::INFINITY,
            ModelType::Ctm => (self.jam_density_veh - self.get_vehicles()).max(0.0),
        }
    }

    // ── Step ──────────────────────────────────────────────────────────────

    /// Recompute demand per partition and supply from the current state.
    pub fn update_supply_demand(&mut self) {
        let total = self.get_vehicles();

        if total < EPSILON {
            self.demand_dwn.clear();
            self.demand_out.clear();
            self.demand_in.clear();
        } else {
            let mut discharge = if self.is_source {
                total.min(self.capacity_veh)
            } else if self.am_dnstrm {
                (self.ffspeed_norm * total).min(self.capacity_veh)
            } else {
                self.ffspeed_norm * total
            };

            // Lane changers still waiting at the boundary hold everything up.
            if self.am_dnstrm && self.lateral_vehicles() > EPSILON {
                discharge = 0.0;
            }

            let alpha = discharge / total;
            scale_into(&self.veh_dwn, alpha, &mut self.demand_dwn);
            scale_into(&self.veh_out, alpha, &mut self.demand_out);
            scale_into(&self.veh_in, alpha, &mut self.demand_in);
        }

        self.supply = if self.is_sink {
            self.capacity_veh
        } else if self.is_source {
            f64::INFINITY
        } else {
            match self.model_type {
                ModelType::Ctm => {
                    let s = self.wspeed_norm * (self.jam_density_veh - total);
                    if self.am_dnstrm { s.min(self.capacity_veh) } else { s }
                }
                ModelType::ManyToOne => f64::INFINITY,
            }
        };
    }

    pub fn update_dwn_state(&mut self, inflow: Option<&KeyFlows>, outflow: Option<&KeyFlows>) {
        self.total_vehs_dwn = apply_flows(&mut self.veh_dwn, inflow, outflow);
    }

    pub fn update_out_state(&mut self, inflow: Option<&KeyFlows>, outflow: Option<&KeyFlows>) {
        self.total_vehs_out = apply_flows(&mut self.veh_out, inflow, outflow);
    }

    pub fn update_in_state(&mut self, inflow: Option<&KeyFlows>, outflow: Option<&KeyFlows>) {
        self.total_vehs_in = apply_flows(&mut self.veh_in, inflow, outflow);
    }

    /// Drop all vehicles and demand.
    pub fn clear(&mut self) {
        for m in [
            &mut self.veh_dwn,
            &mut self.demand_dwn,
            &mut self.veh_out,
            &mut self.demand_out,
            &mut self.veh_in,
            &mut self.demand_in,
        ] {
            m.clear();
        }
        self.total_vehs_dwn = 0.0;
        self.total_vehs_out = 0.0;
        self.total_vehs_in = 0.0;
        self.supply = 0.0;
    }
}

fn scale_into(veh: &KeyFlows, alpha: f64, demand: &mut KeyFlows) {
    demand.clear();
    demand.extend(veh.iter().map(|(&k, &v)| (k, v * alpha)));
}

/// Add `inflow`, subtract `outflow`, and return the new partition total.
/// Non-positive entries are removed, so a missing key reads as exactly 0.
fn apply_flows(veh: &mut KeyFlows, inflow: Option<&KeyFlows>, outflow: Option<&KeyFlows>) -> f64 {
    for (&k, &v) in inflow.into_iter().flatten() {
        if v > 0.0 {
            *veh.entry(k).or_insert(0.0) += v;
        }
    }
    for (&k, &v) in outflow.into_iter().flatten() {
        if v > 0.0 {
            if let Some(x) = veh.get_mut(&k) {
                *x -= v;
            }
        }
    }
    veh.retain(|_, v| *v > 0.0);
    veh.values().sum()
}
