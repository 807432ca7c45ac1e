//! `FlowModel`: the per-step flow exchange over the whole network.
//!
//! # Step phases
//!
//! ```text
//! 1. lane changes    veh_out / veh_in move to the same cell of the neighbor
//!                    lane group, admitted up to that cell's room
//! 2. supply/demand   every cell, independently (parallel with `parallel`)
//! 3. exchange        cell i → cell i+1 inside each lane group
//!                    last cell → first cell of downstream lane groups (nodes)
//!                    last cell of a sink link → out of the network
//!                    source injections → first cell of source lane groups
//! ```
//!
//! Phase 3 is computed entirely from the snapshot left by phase 2 and then
//! applied in one pass, so no cell ever reads a half-updated neighbor.
//!
//! # Admission
//!
//! Each receiving cell admits `min(1, supply / requested)` of what is sent
//! to it.  A lane group sending across a node takes the smallest ratio over
//! all its receivers and applies it to every key (first in, first out).

use std::collections::{BTreeMap, BTreeSet};

use log::trace;
use rustc_hash::FxHashMap;

use ctm_core::{CommodityId, Key, LaneGroupId, LinkId, RoadConnectionId, ValidationLog};
use ctm_network::Network;

use crate::{
    Cell, FlowError, FlowResult, FluidLaneGroup, KeyFlows, LaneChoice, LaneDensities, LaneOptions,
    LaneSelector,
};

/// Source injections for one step: lane group → key → vehicles.
pub type Injections = BTreeMap<LaneGroupId, KeyFlows>;

/// Totals for one completed step.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct StepReport {
    pub injected_veh:  f64,
    pub exited_veh:    f64,
    pub lane_changes:  f64,
    pub total_veh:     f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Side {
    Out,
    In,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Partition {
    Dwn,
    Out,
    In,
}

impl From<Side> for Partition {
    fn from(s: Side) -> Self {
        match s {
            Side::Out => Partition::Out,
            Side::In => Partition::In,
        }
    }
}

// ── Pending changes ───────────────────────────────────────────────────────────

#[derive(Default)]
struct CellDelta {
    in_dwn:  KeyFlows,
    out_dwn: KeyFlows,
    in_out:  KeyFlows,
    out_out: KeyFlows,
    in_in:   KeyFlows,
    out_in:  KeyFlows,
}

impl CellDelta {
    fn inflow(&mut self, p: Partition, key: Key, veh: f64) {
        let m = match p {
            Partition::Dwn => &mut self.in_dwn,
            Partition::Out => &mut self.in_out,
            Partition::In => &mut self.in_in,
        };
        *m.entry(key).or_insert(0.0) += veh;
    }

    fn outflow(&mut self, p: Partition, key: Key, veh: f64) {
        let m = match p {
            Partition::Dwn => &mut self.out_dwn,
            Partition::Out => &mut self.out_out,
            Partition::In => &mut self.out_in,
        };
        *m.entry(key).or_insert(0.0) += veh;
    }

    fn apply(&self, cell: &mut Cell) {
        cell.update_dwn_state(Some(&self.in_dwn), Some(&self.out_dwn));
        cell.update_out_state(Some(&self.in_out), Some(&self.out_out));
        cell.update_in_state(Some(&self.in_in), Some(&self.out_in));
    }
}

/// Everything a phase wants to change, collected before any of it is applied.
#[derive(Default)]
struct Pending {
    cells:   BTreeMap<(LaneGroupId, usize), CellDelta>,
    entered: Vec<(LaneGroupId, CommodityId, f64)>,
    exited:  Vec<(LaneGroupId, CommodityId, f64)>,
}

impl Pending {
    fn cell(&mut self, lg: LaneGroupId, i: usize) -> &mut CellDelta {
        self.cells.entry((lg, i)).or_default()
    }

    fn place(&mut self, lg: LaneGroupId, key: Key, veh: f64, choice: LaneChoice) {
        let d = self.cell(lg, 0);
        for (p, f) in [(Partition::Dwn, choice.dwn), (Partition::Out, choice.out), (Partition::In, choice.inn)] {
            if f > 0.0 {
                d.inflow(p, key, veh * f);
            }
        }
        self.entered.push((lg, key.commodity, veh));
    }
}

/// Flow leaving one lane group across its downstream node.
struct NodeSend {
    from:    LaneGroupId,
    key:     Key,
    veh:     f64,
    /// `None` when the flow leaves the network.
    next:    Option<LinkId>,
    targets: Vec<(LaneGroupId, f64)>,
}

// ── FlowModel ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct FlowModel {
    pub dt_secs:    f64,
    /// Indexed by `LaneGroupId`.
    pub lanegroups: Vec<FluidLaneGroup>,
    /// Road connections currently held at red.
    pub red_connections: BTreeSet<RoadConnectionId>,
    injected_total: f64,
    exited_total:   f64,
}

impl FlowModel {
    pub fn new(net: &Network, dt_secs: f64) -> Self {
        let lanegroups = net
            .lanegroups
            .iter()
            .map(|lg| FluidLaneGroup::new(lg, &net.links[lg.link.index()], dt_secs))
            .collect();
        Self {
            dt_secs,
            lanegroups,
            red_connections: BTreeSet::new(),
            injected_total: 0.0,
            exited_total: 0.0,
        }
    }

    pub fn validate(&self, log: &mut ValidationLog) {
        if !(self.dt_secs > 0.0) {
            log.add_error(format!("flow model: step must be positive, got {}", self.dt_secs));
            return;
        }
        for lg in &self.lanegroups {
            lg.validate(log);
        }
    }

    // ── Access ────────────────────────────────────────────────────────────

    pub fn lanegroup(&self, id: LaneGroupId) -> FlowResult<&FluidLaneGroup> {
        self.lanegroups.get(id.index()).ok_or(FlowError::UnknownLaneGroup(id))
    }

    pub fn lanegroup_mut(&mut self, id: LaneGroupId) -> FlowResult<&mut FluidLaneGroup> {
        self.lanegroups.get_mut(id.index()).ok_or(FlowError::UnknownLaneGroup(id))
    }

    pub fn link_vehicles(&self, net: &Network, link: LinkId) -> FlowResult<f64> {
        let l = net.link(link)?;
        l.lanegroups
            .iter()
            .map(|&lg| self.lanegroup(lg).map(FluidLaneGroup::total_vehicles))
            .sum()
    }

    pub fn total_vehicles(&self) -> f64 {
        self.lanegroups.iter().map(FluidLaneGroup::total_vehicles).sum()
    }

    /// Vehicles injected by sources since the last reset.
    pub fn injected_total(&self) -> f64 {
        self.injected_total
    }

    /// Vehicles that left through sink links since the last reset.
    pub fn exited_total(&self) -> f64 {
        self.exited_total
    }

    // ── Configuration ─────────────────────────────────────────────────────

    /// Put `veh` vehicles of `key` in the downstream partition of a cell,
    /// replacing whatever was there for that key.
    pub fn set_vehicles(&mut self, lanegroup: LaneGroupId, cell: usize, key: Key, veh: f64) -> FlowResult<()> {
        if !(veh >= 0.0) {
            return Err(FlowError::NegativeVehicles { key, veh });
        }
        let c = self
            .lanegroup_mut(lanegroup)?
            .cells
            .get_mut(cell)
            .ok_or(FlowError::CellOutOfRange { lanegroup, cell })?;
        c.veh_dwn.insert(key, veh);
        c.veh_dwn.retain(|_, v| *v > 0.0);
        c.total_vehs_dwn = c.veh_dwn.values().sum();
        Ok(())
    }

    pub fn set_red(&mut self, rc: RoadConnectionId, red: bool) {
        if red {
            self.red_connections.insert(rc);
        } else {
            self.red_connections.remove(&rc);
        }
    }

    /// Sample densities into a polled logit selector.  Returns the selector's
    /// period when it wants to be poked again.
    pub fn refresh_lane_selector(
        &mut self,
        net: &Network,
        lanegroup: LaneGroupId,
        commodity: CommodityId,
    ) -> FlowResult<Option<f64>> {
        let rho = self.densities(net, lanegroup)?;
        let lg = self.lanegroup_mut(lanegroup)?;
        match lg.lane_selectors.get_mut(&commodity) {
            Some(LaneSelector::Logit(l)) if l.dt_secs.is_some() => {
                l.cached = Some(rho);
                Ok(l.dt_secs)
            }
            _ => Ok(None),
        }
    }

    /// Empty every cell and zero all counters.
    pub fn clear_state(&mut self) {
        self.lanegroups.iter_mut().for_each(FluidLaneGroup::clear);
        self.injected_total = 0.0;
        self.exited_total = 0.0;
    }

    // ── Step ──────────────────────────────────────────────────────────────

    /// Advance the whole network by one step.
    pub fn update(&mut self, net: &Network, injections: &Injections) -> FlowResult<StepReport> {
        let lane_changes = self.exchange_lateral(net)?;

        #[cfg(not(feature = "parallel"))]
        self.lanegroups.iter_mut().for_each(FluidLaneGroup::update_supply_demand);

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            self.lanegroups.par_iter_mut().for_each(FluidLaneGroup::update_supply_demand);
        }

        let (injected_veh, exited_veh) = self.exchange_longitudinal(net, injections)?;
        self.injected_total += injected_veh;
        self.exited_total += exited_veh;

        let report = StepReport {
            injected_veh,
            exited_veh,
            lane_changes,
            total_veh: self.total_vehicles(),
        };
        trace!(
            "flow step: {:.4} veh in, {:.4} veh out, {:.4} changing lanes, {:.4} on network",
            report.injected_veh,
            report.exited_veh,
            report.lane_changes,
            report.total_veh
        );
        Ok(report)
    }

    /// Phase 1.  Returns the number of vehicles that changed lanes.
    ///
    /// Lane changers whose target lane group is closed to their commodity
    /// stay in `veh_out`/`veh_in` of their cell and move once it reopens.
    fn exchange_lateral(&mut self, net: &Network) -> FlowResult<f64> {
        struct Move {
            from:  (LaneGroupId, usize),
            side:  Side,
            to:    LaneGroupId,
            flows: Vec<(Key, f64)>,
        }

        let mut moves = Vec::new();
        let mut requested: FxHashMap<(LaneGroupId, usize), f64> = FxHashMap::default();
        for lg in &self.lanegroups {
            let topo = net.lanegroup(lg.id)?;
            for (side, neighbor) in [(Side::Out, topo.neighbor_out), (Side::In, topo.neighbor_in)] {
                let Some(to) = neighbor else { continue };
                let target = self.lanegroup(to)?;
                for (i, cell) in lg.cells.iter().enumerate() {
                    let veh = match side {
                        Side::Out => &cell.veh_out,
                        Side::In => &cell.veh_in,
                    };
                    let flows: Vec<(Key, f64)> = veh
                        .iter()
                        .filter(|(k, _)| target.is_open(k.commodity))
                        .map(|(&k, &v)| (k, v))
                        .collect();
                    let total: f64 = flows.iter().map(|(_, v)| v).sum();
                    if total <= 0.0 || i >= target.cells.len() {
                        continue;
                    }
                    *requested.entry((to, i)).or_insert(0.0) += total;
                    moves.push(Move { from: (lg.id, i), side, to, flows });
                }
            }
        }

        let ratio = |at: (LaneGroupId, usize)| -> f64 {
            let req = requested.get(&at).copied().unwrap_or(0.0);
            let room = self.lanegroups[at.0.index()].cells[at.1].room();
            admit(room, req)
        };

        let mut pending = Pending::default();
        let mut changed = 0.0;
        for m in &moves {
            let r = ratio((m.to, m.from.1));
            if r <= 0.0 {
                continue;
            }
            for &(key, v) in &m.flows {
                let moved = v * r;
                pending.cell(m.from.0, m.from.1).outflow(m.side.into(), key, moved);
                let p = self.lateral_arrival(net, m.to, m.side, key)?;
                pending.cell(m.to, m.from.1).inflow(p, key, moved);
                pending.entered.push((m.to, key.commodity, moved));
                changed += moved;
            }
        }
        self.apply(pending);
        Ok(changed)
    }

    /// Phase 3.  Returns `(injected, exited)` vehicles.
    fn exchange_longitudinal(&mut self, net: &Network, injections: &Injections) -> FlowResult<(f64, f64)> {
        let mut requested: FxHashMap<(LaneGroupId, usize), f64> = FxHashMap::default();

        // Inside each lane group.
        for lg in &self.lanegroups {
            for i in 1..lg.cells.len() {
                let sent: f64 = lg.cells[i - 1].demand_dwn.values().sum();
                if sent > 0.0 {
                    *requested.entry((lg.id, i)).or_insert(0.0) += sent;
                }
            }
        }

        // Across nodes.
        let mut sends: Vec<NodeSend> = Vec::new();
        for lg in &self.lanegroups {
            let Some(last) = lg.cells.last() else { continue };
            let link = lg.link;
            let first = sends.len();
            for (&key, &veh) in &last.demand_dwn {
                if veh <= 0.0 {
                    continue;
                }
                let next = net.next_link(link, key)?;
                let targets = match next {
                    None => Vec::new(),
                    Some(n) => match self.receivers(net, lg.id, n, key.commodity) {
                        Some(t) => t,
                        None => continue,
                    },
                };
                sends.push(NodeSend { from: lg.id, key, veh, next, targets });
            }
            if let Some(meter) = lg.meter_veh_per_step {
                let total: f64 = sends[first..].iter().map(|s| s.veh).sum();
                if total > meter {
                    let f = meter.max(0.0) / total;
                    sends[first..].iter_mut().for_each(|s| s.veh *= f);
                }
            }
        }
        for s in &sends {
            for &(to, share) in &s.targets {
                *requested.entry((to, 0)).or_insert(0.0) += s.veh * share;
            }
        }

        let ratio = |at: (LaneGroupId, usize)| -> f64 {
            let req = requested.get(&at).copied().unwrap_or(0.0);
            admit(self.lanegroups[at.0.index()].cells[at.1].supply, req)
        };

        // One ratio per sending lane group across its node.
        let mut gamma: FxHashMap<LaneGroupId, f64> = FxHashMap::default();
        for s in &sends {
            let g = gamma.entry(s.from).or_insert(1.0);
            for &(to, _) in &s.targets {
                *g = g.min(ratio((to, 0)));
            }
        }

        let mut pending = Pending::default();
        for lg in &self.lanegroups {
            for i in 1..lg.cells.len() {
                let r = ratio((lg.id, i));
                if r <= 0.0 {
                    continue;
                }
                for (&key, &v) in &lg.cells[i - 1].demand_dwn {
                    let moved = v * r;
                    pending.cell(lg.id, i - 1).outflow(Partition::Dwn, key, moved);
                    pending.cell(lg.id, i).inflow(Partition::Dwn, key, moved);
                }
            }
        }

        let mut exited = 0.0;
        for s in &sends {
            let g = gamma.get(&s.from).copied().unwrap_or(1.0);
            let moved = s.veh * g;
            if moved <= 0.0 {
                continue;
            }
            let last = self.lanegroups[s.from.index()].cells.len() - 1;
            pending.cell(s.from, last).outflow(Partition::Dwn, s.key, moved);
            pending.exited.push((s.from, s.key.commodity, moved));
            let Some(next) = s.next else {
                exited += moved;
                continue;
            };
            let keys = self.arrival_keys(net, next, s.key)?;
            for &(to, share) in &s.targets {
                for &(key, frac) in &keys {
                    let veh = moved * share * frac;
                    let choice = self.lane_choice(net, to, key)?;
                    pending.place(to, key, veh, choice);
                }
            }
        }

        let mut injected = 0.0;
        for (&lg, flows) in injections {
            self.lanegroup(lg)?;
            for (&key, &veh) in flows {
                if veh <= 0.0 {
                    continue;
                }
                let choice = self.lane_choice(net, lg, key)?;
                pending.place(lg, key, veh, choice);
                injected += veh;
            }
        }

        self.apply(pending);
        Ok((injected, exited))
    }

    fn apply(&mut self, pending: Pending) {
        for ((lg, i), d) in &pending.cells {
            d.apply(&mut self.lanegroups[lg.index()].cells[*i]);
        }
        for (lg, c, v) in pending.entered {
            self.lanegroups[lg.index()].entered.add(c, v);
        }
        for (lg, c, v) in pending.exited {
            self.lanegroups[lg.index()].exited.add(c, v);
        }
    }

    // ── Routing helpers ───────────────────────────────────────────────────

    /// Lane groups of `next` receiving flow of `commodity` from `from`, with
    /// the share each gets (by lanes).  `None` when nothing can pass.
    fn receivers(
        &self,
        net: &Network,
        from: LaneGroupId,
        next: LinkId,
        commodity: CommodityId,
    ) -> Option<Vec<(LaneGroupId, f64)>> {
        let rc = net.road_connection_toward(from, next)?;
        if self.red_connections.contains(&rc.id) {
            return None;
        }
        let open: Vec<(LaneGroupId, f64)> = rc
            .to_lanegroups
            .iter()
            .filter_map(|&lg| self.lanegroups.get(lg.index()))
            .filter(|lg| lg.is_open(commodity))
            .map(|lg| (lg.id, lg.num_lanes as f64))
            .collect();
        let lanes: f64 = open.iter().map(|(_, n)| n).sum();
        if lanes <= 0.0 {
            return None;
        }
        Some(open.into_iter().map(|(lg, n)| (lg, n / lanes)).collect())
    }

    /// Keys flow of `key` carries after entering `link`.  Path keys are kept;
    /// pathless keys are re-targeted by the split ratios of `link`.
    fn arrival_keys(&self, net: &Network, link: LinkId, key: Key) -> FlowResult<Vec<(Key, f64)>> {
        if key.is_path {
            return Ok(vec![(key, 1.0)]);
        }
        let targets = net.pathless_targets(link, key.commodity)?;
        let sum: f64 = targets.iter().map(|(_, r)| r).sum();
        if sum <= 0.0 {
            return Ok(vec![(Key::next_link(key.commodity, link), 1.0)]);
        }
        Ok(targets
            .into_iter()
            .map(|(n, r)| (Key::next_link(key.commodity, n), r / sum))
            .collect())
    }

    /// Lane selection for flow of `key` entering `lanegroup`.
    pub fn lane_choice(&self, net: &Network, lanegroup: LaneGroupId, key: Key) -> FlowResult<LaneChoice> {
        let topo = net.lanegroup(lanegroup)?;
        let lg = self.lanegroup(lanegroup)?;
        let options = LaneOptions {
            stay:  lg.is_open(key.commodity) && net.lanegroup_reaches(lanegroup, key)?,
            outer: self.side_reaches(net, topo.neighbor_out, Side::Out, key)?,
            inner: self.side_reaches(net, topo.neighbor_in, Side::In, key)?,
        };
        let mut live_err = None;
        let choice = lg.lane_selector(key.commodity).choose(options, || {
            self.densities(net, lanegroup).unwrap_or_else(|e| {
                live_err = Some(e);
                LaneDensities::default()
            })
        });
        match live_err {
            Some(e) => Err(e),
            None => Ok(choice),
        }
    }

    /// Whether an open lane group reaching `key`'s destination lies on this
    /// side, through open lane groups only.
    fn side_reaches(&self, net: &Network, mut cur: Option<LaneGroupId>, side: Side, key: Key) -> FlowResult<bool> {
        while let Some(id) = cur {
            if !self.lanegroup(id)?.is_open(key.commodity) {
                return Ok(false);
            }
            if net.lanegroup_reaches(id, key)? {
                return Ok(true);
            }
            let topo = net.lanegroup(id)?;
            cur = match side {
                Side::Out => topo.neighbor_out,
                Side::In => topo.neighbor_in,
            };
        }
        Ok(false)
    }

    /// Where a lane changer moving `side` into `to` ends up: settled if `to`
    /// gets it there, otherwise still moving the same way if it can.
    fn lateral_arrival(&self, net: &Network, to: LaneGroupId, side: Side, key: Key) -> FlowResult<Partition> {
        if self.lanegroup(to)?.is_open(key.commodity) && net.lanegroup_reaches(to, key)? {
            return Ok(Partition::Dwn);
        }
        let topo = net.lanegroup(to)?;
        let onward = match side {
            Side::Out => topo.neighbor_out,
            Side::In => topo.neighbor_in,
        };
        Ok(if onward.is_some() { side.into() } else { Partition::Dwn })
    }

    fn densities(&self, net: &Network, lanegroup: LaneGroupId) -> FlowResult<LaneDensities> {
        let topo = net.lanegroup(lanegroup)?;
        let rho = |id: Option<LaneGroupId>| -> FlowResult<f64> {
            match id {
                Some(id) => Ok(self.lanegroup(id)?.density_vpkpl()),
                None => Ok(0.0),
            }
        };
        Ok(LaneDensities {
            inner: rho(topo.neighbor_in)?,
            own:   rho(Some(lanegroup))?,
            outer: rho(topo.neighbor_out)?,
        })
    }
}

/// Fraction of `requested` a receiver with `capacity` admits.
#[inline]
fn admit(capacity: f64, requested: f64) -> f64 {
    if requested <= 0.0 {
        1.0
    } else {
        (capacity / requested).clamp(0.0, 1.0)
    }
}
