//! `FluidLaneGroup`: the vehicle state of one lane group.

use std::collections::BTreeMap;

use ctm_core::{CommodityId, LaneGroupId, LinkId, ValidationLog};
use ctm_network::{LaneGroup, Link};

use crate::cell::CFL_TOL;
use crate::{Cell, FlowAccumulator, LaneSelector};

static KEEP: LaneSelector = LaneSelector::Keep;

/// Whether a commodity may enter a lane group.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Restriction {
    #[default]
    Open,
    Closed,
}

#[derive(Clone, Debug)]
pub struct FluidLaneGroup {
    pub id:        LaneGroupId,
    pub link:      LinkId,
    pub num_lanes: u32,
    pub length_m:  f64,
    /// Free-flow speed, km/h.
    pub speed_kph:    f64,
    /// Capacity over all lanes, veh/h.
    pub capacity_vph: f64,
    /// Upstream → downstream.
    pub cells: Vec<Cell>,
    /// Commodities without an entry use [`LaneSelector::Keep`].
    pub lane_selectors: BTreeMap<CommodityId, LaneSelector>,
    /// Commodities without an entry are open.
    pub restrictions: BTreeMap<CommodityId, Restriction>,
    /// Node outflow limit set by a ramp meter, veh per step.
    pub meter_veh_per_step: Option<f64>,
    /// Vehicles entering from upstream, from a source, or from a lateral neighbor.
    pub entered: FlowAccumulator,
    /// Vehicles leaving through the downstream end.
    pub exited:  FlowAccumulator,
}

impl FluidLaneGroup {
    /// Cells of length at least `speed · dt`; a source link gets one cell,
    /// and so does any lane group when `speed · dt` is not a positive length.
    pub fn new(lg: &LaneGroup, link: &Link, dt_secs: f64) -> Self {
        let params = &link.road_params;
        let ff_step_m = params.speed_kph * 1_000.0 / 3_600.0 * dt_secs;
        let num_cells = if link.is_source || !(ff_step_m.is_finite() && ff_step_m > 0.0) {
            1
        } else {
            ((lg.length_m / ff_step_m + CFL_TOL).floor() as usize).max(1)
        };
        let cell_length_m = lg.length_m / num_cells as f64;
        let cells = (0..num_cells)
            .map(|i| {
                let mut c = Cell::new(link.model_type, link.is_source, link.is_sink);
                c.set_road_params(params, lg.num_lanes, cell_length_m, dt_secs);
                c.am_upstrm = i == 0;
                c.am_dnstrm = i + 1 == num_cells;
                c
            })
            .collect();
        Self {
            id: lg.id,
            link: lg.link,
            num_lanes: lg.num_lanes,
            length_m: lg.length_m,
            speed_kph: params.speed_kph,
            capacity_vph: params.capacity_vphpl * lg.num_lanes as f64,
            cells,
            lane_selectors: BTreeMap::new(),
            restrictions: BTreeMap::new(),
            meter_veh_per_step: None,
            entered: FlowAccumulator::default(),
            exited: FlowAccumulator::default(),
        }
    }

    pub fn cell_length_m(&self) -> f64 {
        self.length_m / self.cells.len() as f64
    }

    pub fn total_vehicles(&self) -> f64 {
        self.cells.iter().map(Cell::get_vehicles).sum()
    }

    pub fn vehicles_for_commodity(&self, commodity: Option<CommodityId>) -> f64 {
        self.cells.iter().map(|c| c.get_veh_dwn_for_commodity(commodity)).sum()
    }

    /// Vehicles per km per lane.
    pub fn density_vpkpl(&self) -> f64 {
        self.total_vehicles() / (self.length_m / 1_000.0) / self.num_lanes as f64
    }

    pub fn is_open(&self, commodity: CommodityId) -> bool {
        self.restrictions.get(&commodity).copied().unwrap_or_default() == Restriction::Open
    }

    pub fn lane_selector(&self, commodity: CommodityId) -> &LaneSelector {
        self.lane_selectors.get(&commodity).unwrap_or(&KEEP)
    }

    /// Install `selector` for `commodity`, returning the one it replaces.
    pub fn set_lane_selector(&mut self, commodity: CommodityId, selector: LaneSelector) -> Option<LaneSelector> {
        self.lane_selectors.insert(commodity, selector)
    }

    pub fn update_supply_demand(&mut self) {
        self.cells.iter_mut().for_each(Cell::update_supply_demand);
    }

    pub fn validate(&self, log: &mut ValidationLog) {
        for (i, c) in self.cells.iter().enumerate() {
            c.validate(&format!("{} ({}) cell {i}", self.id, self.link), log);
        }
    }

    /// Drop all vehicles and zero the accumulators.
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(Cell::clear);
        self.entered.reset();
        self.exited.reset();
    }
}
