//! `DemandGenerator`: one source of exogenous flow.
//!
//! # Splitting the per-step volume
//!
//! `volume = rate_vps · dt` vehicles enter per model step.  Where they go:
//!
//! ```text
//! pathfull           Key(c, path), split equally over the lane groups of
//!                    the source link that connect to the path's next link
//! pathless, ≤1 out   Key(c, only outlink | the link itself if a sink),
//!                    split over all lane groups by capacity
//! pathless, ≥2 out   per split ratio r > EPSILON: volume · r as
//!                    Key(c, outlink), split over the lane groups toward
//!                    that outlink in proportion to their lanes
//! ```

use std::collections::BTreeMap;

use log::debug;

use ctm_core::{
    CommodityId, DemandId, EPSILON, Key, LaneGroupId, LinkId, PathId, Profile1D, SimTime,
    ValidationLog,
};
use ctm_dispatch::{Action, Dispatcher, Event};
use ctm_flow::KeyFlows;
use ctm_network::{Network, NetworkError};

use crate::{DemandError, DemandResult};

const SECS_PER_HOUR: f64 = 3_600.0;

#[derive(Clone, Debug)]
pub struct DemandGenerator {
    pub id:        DemandId,
    pub link:      LinkId,
    pub commodity: CommodityId,
    /// Required for pathfull commodities, ignored otherwise.
    pub path:      Option<PathId>,
    /// Demand in veh/h.
    pub profile:   Profile1D,
    /// Rate in effect, veh/s.
    source_demand_vps: f64,
    /// Vehicles injected per step, by lane group and key.
    source_flows: BTreeMap<LaneGroupId, KeyFlows>,
}

impl DemandGenerator {
    pub fn new(
        id: DemandId,
        link: LinkId,
        commodity: CommodityId,
        path: Option<PathId>,
        profile: Profile1D,
    ) -> Self {
        Self {
            id,
            link,
            commodity,
            path,
            profile,
            source_demand_vps: 0.0,
            source_flows: BTreeMap::new(),
        }
    }

    pub fn demand_vps(&self) -> f64 {
        self.source_demand_vps
    }

    pub fn source_flows(&self) -> &BTreeMap<LaneGroupId, KeyFlows> {
        &self.source_flows
    }

    /// Vehicles injected per step over all lane groups.
    pub fn volume_per_step(&self) -> f64 {
        self.source_flows.values().flat_map(|f| f.values()).sum()
    }

    pub fn validate(&self, net: &Network, log: &mut ValidationLog) {
        let what = format!("demand {} on {}", self.id.0, self.link);
        let link = match net.link(self.link) {
            Ok(l) => l,
            Err(e) => {
                log.add_error(format!("{what}: {e}"));
                return;
            }
        };
        if !link.is_source {
            log.add_error(format!("{what}: link is not a source"));
        }
        match net.commodity(self.commodity) {
            Err(e) => log.add_error(format!("{what}: {e}")),
            Ok(c) if c.pathfull => match self.path {
                None => log.add_error(format!("{what}: pathfull {} needs a path", c.id)),
                Some(pid) => match net.path(pid) {
                    Err(e) => log.add_error(format!("{what}: {e}")),
                    Ok(p) if !p.contains(self.link) => {
                        log.add_error(format!("{what}: {pid} does not contain the link"))
                    }
                    Ok(_) if !c.paths.contains(&pid) => {
                        log.add_error(format!("{what}: {pid} is not a path of {}", c.id))
                    }
                    Ok(_) => {}
                },
            },
            Ok(_) => {}
        }
        self.profile.validate(&what, log);
    }

    /// Set the rate and recompute the lane-group split for a step of `dt_secs`.
    pub fn set_demand_vps(&mut self, rate_vps: f64, dt_secs: f64, net: &Network) -> DemandResult<()> {
        let volume = rate_vps.max(0.0) * dt_secs;
        let flows = self.split(volume, net)?;
        debug!("{} on {}: {:.4} veh/s", self.id, self.link, rate_vps);
        self.source_demand_vps = rate_vps.max(0.0);
        self.source_flows = flows;
        Ok(())
    }

    /// Stop injecting; the profile is untouched.
    pub fn clear(&mut self) {
        self.source_demand_vps = 0.0;
        self.source_flows.clear();
    }

    /// Schedule the rate in effect at the dispatcher's current time.
    pub fn register_initial_change(&self, dispatcher: &mut Dispatcher) -> DemandResult<()> {
        let now = dispatcher.current_time();
        let rate_vps = self.profile.value_at(now.as_secs()) / SECS_PER_HOUR;
        dispatcher.register_event(Event::new(
            now,
            Action::DemandChange { demand: self.id, rate_vps },
        ))?;
        Ok(())
    }

    /// Schedule the first profile breakpoint strictly after `after`, if any.
    pub fn register_next_change(&self, dispatcher: &mut Dispatcher, after: SimTime) -> DemandResult<()> {
        if let Some((t, value)) = self.profile.next_change_after(after.as_secs()) {
            dispatcher.register_event(Event::new(
                SimTime::from_secs(t),
                Action::DemandChange { demand: self.id, rate_vps: value / SECS_PER_HOUR },
            ))?;
        }
        Ok(())
    }

    // ── Splitting ─────────────────────────────────────────────────────────

    fn split(&self, volume: f64, net: &Network) -> DemandResult<BTreeMap<LaneGroupId, KeyFlows>> {
        let link = net.link(self.link)?;
        let commodity = net.commodity(self.commodity)?;
        let mut flows: BTreeMap<LaneGroupId, KeyFlows> = BTreeMap::new();

        if commodity.pathfull {
            let pid = self
                .path
                .ok_or(DemandError::PathRequired { commodity: self.commodity, link: self.link })?;
            let path = net.path(pid)?;
            if !path.contains(self.link) {
                return Err(NetworkError::LinkNotOnPath { path: pid, link: self.link }.into());
            }
            let lgs: &[LaneGroupId] = match path.link_following(self.link) {
                None => &link.lanegroups,
                Some(next) => net.lanegroups_toward(self.link, next),
            };
            if lgs.is_empty() {
                let next = path.link_following(self.link).unwrap_or(self.link);
                return Err(DemandError::NoLaneGroups { link: self.link, next });
            }
            let key = Key::path(self.commodity, pid);
            let share = volume / lgs.len() as f64;
            for &lg in lgs {
                add(&mut flows, lg, key, share);
            }
            return Ok(flows);
        }

        if link.outlink2lanegroups.len() < 2 {
            let next = link.out_links().next().unwrap_or(self.link);
            let key = Key::next_link(self.commodity, next);
            let capacities = link
                .lanegroups
                .iter()
                .map(|&lg| {
                    net.lanegroup(lg)
                        .map(|g| g.num_lanes as f64 * link.road_params.capacity_vphpl)
                })
                .collect::<Result<Vec<f64>, _>>()?;
            let total: f64 = capacities.iter().sum();
            let equal = !(total.is_finite() && total > 0.0);
            for (&lg, cap) in link.lanegroups.iter().zip(&capacities) {
                let share = if equal {
                    volume / link.lanegroups.len() as f64
                } else {
                    volume * cap / total
                };
                add(&mut flows, lg, key, share);
            }
            return Ok(flows);
        }

        for (next, ratio) in net.pathless_targets(self.link, self.commodity)? {
            debug_assert!(ratio > EPSILON);
            let lgs = net.lanegroups_toward(self.link, next);
            if lgs.is_empty() {
                return Err(DemandError::NoLaneGroups { link: self.link, next });
            }
            let lanes = lgs
                .iter()
                .map(|&lg| net.lanegroup(lg).map(|g| g.num_lanes as f64))
                .collect::<Result<Vec<f64>, _>>()?;
            let total_lanes: f64 = lanes.iter().sum();
            let key = Key::next_link(self.commodity, next);
            for (&lg, n) in lgs.iter().zip(&lanes) {
                add(&mut flows, lg, key, volume * ratio * n / total_lanes);
            }
        }
        Ok(flows)
    }
}

fn add(flows: &mut BTreeMap<LaneGroupId, KeyFlows>, lg: LaneGroupId, key: Key, veh: f64) {
    *flows.entry(lg).or_default().entry(key).or_insert(0.0) += veh;
}
