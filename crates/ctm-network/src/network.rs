//! The assembled road network.
//!
//! # Data layout
//!
//! Every element lives in a dense `Vec` indexed by its typed id, and every
//! relation is an id:
//!
//! ```text
//! Node ──in_links/out_links──▶ Link ──lanegroups──▶ LaneGroup
//!                               │                      │
//!                               └─ outlink2lanegroups  └─ road_connections ─▶ RoadConnection
//! ```
//!
//! All fields are `pub` for direct indexed access on hot paths.  Do not
//! construct directly; use [`NetworkBuilder`](crate::NetworkBuilder).

use std::collections::BTreeMap;

use ctm_core::{
    CommodityId, EPSILON, Key, LaneGroupId, LinkId, NodeId, PathId, RoadConnectionId,
};

use crate::{Commodity, ModelType, NetworkError, NetworkResult, Path, RoadParams};

/// Tolerance on the sum of a commodity's split ratios at a diverge.
pub const SPLIT_SUM_TOL: f64 = 1e-3;

// ── Elements ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Node {
    pub id:               NodeId,
    pub in_links:         Vec<LinkId>,
    pub out_links:        Vec<LinkId>,
    pub road_connections: Vec<RoadConnectionId>,
}

#[derive(Clone, Debug)]
pub struct Link {
    pub id:          LinkId,
    pub start_node:  NodeId,
    pub end_node:    NodeId,
    pub length_m:    f64,
    pub full_lanes:  u32,
    pub road_params: RoadParams,
    pub model_type:  ModelType,
    /// No links enter the start node.
    pub is_source:   bool,
    /// No links leave the end node.
    pub is_sink:     bool,
    /// Lane groups, inner → outer.
    pub lanegroups:  Vec<LaneGroupId>,
    /// Downstream link → lane groups of this link with a road connection to it.
    pub outlink2lanegroups: BTreeMap<LinkId, Vec<LaneGroupId>>,
    /// Pathless split ratios: commodity → (next link → ratio).
    pub splits: BTreeMap<CommodityId, BTreeMap<LinkId, f64>>,
}

impl Link {
    /// Links reachable from this one through a road connection.
    pub fn out_links(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.outlink2lanegroups.keys().copied()
    }

    /// Link capacity in veh/h across all lanes.
    pub fn capacity_vph(&self) -> f64 {
        self.road_params.capacity_vphpl * self.full_lanes as f64
    }
}

#[derive(Clone, Debug)]
pub struct LaneGroup {
    pub id:           LaneGroupId,
    pub link:         LinkId,
    pub num_lanes:    u32,
    /// 1-based index of the innermost lane of this group.
    pub start_lane:   u32,
    pub length_m:     f64,
    pub neighbor_in:  Option<LaneGroupId>,
    pub neighbor_out: Option<LaneGroupId>,
    /// Road connections leaving this lane group.
    pub road_connections: Vec<RoadConnectionId>,
    /// Downstream links reachable from this lane group.
    pub outlinks: Vec<LinkId>,
}

/// Lane groups of one link feeding lane groups of the next, through a node.
#[derive(Clone, Debug)]
pub struct RoadConnection {
    pub id:              RoadConnectionId,
    pub from_link:       LinkId,
    pub from_lanegroups: Vec<LaneGroupId>,
    pub to_link:         LinkId,
    pub to_lanegroups:   Vec<LaneGroupId>,
}

// ── Network ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct Network {
    pub nodes:            Vec<Node>,
    pub links:            Vec<Link>,
    pub lanegroups:       Vec<LaneGroup>,
    pub road_connections: Vec<RoadConnection>,
    pub commodities:      Vec<Commodity>,
    pub paths:            Vec<Path>,
}

impl Network {
    // ── Checked lookup ────────────────────────────────────────────────────

    pub fn node(&self, id: NodeId) -> NetworkResult<&Node> {
        self.nodes.get(id.index()).ok_or(NetworkError::NodeNotFound(id))
    }

    pub fn link(&self, id: LinkId) -> NetworkResult<&Link> {
        self.links.get(id.index()).ok_or(NetworkError::LinkNotFound(id))
    }

    pub fn lanegroup(&self, id: LaneGroupId) -> NetworkResult<&LaneGroup> {
        self.lanegroups.get(id.index()).ok_or(NetworkError::LaneGroupNotFound(id))
    }

    pub fn road_connection(&self, id: RoadConnectionId) -> NetworkResult<&RoadConnection> {
        self.road_connections
            .get(id.index())
            .ok_or(NetworkError::RoadConnectionNotFound(id))
    }

    pub fn commodity(&self, id: CommodityId) -> NetworkResult<&Commodity> {
        self.commodities.get(id.index()).ok_or(NetworkError::CommodityNotFound(id))
    }

    pub fn path(&self, id: PathId) -> NetworkResult<&Path> {
        self.paths.get(id.index()).ok_or(NetworkError::PathNotFound(id))
    }

    // ── Dimensions ────────────────────────────────────────────────────────

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn lanegroup_count(&self) -> usize {
        self.lanegroups.len()
    }

    pub fn source_links(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.links.iter().filter(|l| l.is_source).map(|l| l.id)
    }

    // ── Routing ───────────────────────────────────────────────────────────

    /// The link flow of `key` on `link` moves to next, or `None` if it
    /// leaves the network at the end of `link`.
    pub fn next_link(&self, link: LinkId, key: Key) -> NetworkResult<Option<LinkId>> {
        match key.path_id() {
            Some(pid) => {
                let path = self.path(pid)?;
                if !path.contains(link) {
                    return Err(NetworkError::LinkNotOnPath { path: pid, link });
                }
                Ok(path.link_following(link))
            }
            None => {
                let next = LinkId(key.target);
                Ok((next != link).then_some(next))
            }
        }
    }

    /// Lane groups of `link` with a road connection to `next`.
    pub fn lanegroups_toward(&self, link: LinkId, next: LinkId) -> &[LaneGroupId] {
        self.links
            .get(link.index())
            .and_then(|l| l.outlink2lanegroups.get(&next))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The road connection leaving `lanegroup` toward `next`, if any.
    pub fn road_connection_toward(
        &self,
        lanegroup: LaneGroupId,
        next: LinkId,
    ) -> Option<&RoadConnection> {
        let lg = self.lanegroups.get(lanegroup.index())?;
        lg.road_connections
            .iter()
            .map(|rc| &self.road_connections[rc.index()])
            .find(|rc| rc.to_link == next)
    }

    /// Whether flow of `key` in `lanegroup` can get where it is going from
    /// this lane group without changing lanes.
    pub fn lanegroup_reaches(&self, lanegroup: LaneGroupId, key: Key) -> NetworkResult<bool> {
        let lg = self.lanegroup(lanegroup)?;
        Ok(match self.next_link(lg.link, key)? {
            None => true,
            Some(next) => lg.outlinks.contains(&next),
        })
    }

    /// Where pathless `commodity` goes after entering `link`, with the share
    /// of its flow taking each option.
    ///
    /// A sink link targets itself.  A link with one outlink needs no split
    /// ratios.  Otherwise the commodity's split ratios are used, dropping
    /// those at or below [`EPSILON`].
    pub fn pathless_targets(
        &self,
        link: LinkId,
        commodity: CommodityId,
    ) -> NetworkResult<Vec<(LinkId, f64)>> {
        let l = self.link(link)?;
        if l.is_sink {
            return Ok(vec![(link, 1.0)]);
        }
        if l.outlink2lanegroups.len() == 1 {
            return Ok(l.out_links().map(|n| (n, 1.0)).collect());
        }
        let splits = l
            .splits
            .get(&commodity)
            .ok_or(NetworkError::MissingSplits { link, commodity })?;
        Ok(splits
            .iter()
            .filter(|&(_, &r)| r > EPSILON)
            .map(|(&n, &r)| (n, r))
            .collect())
    }

    /// Replace the split ratios of `commodity` on `link`.
    pub fn set_splits(
        &mut self,
        link: LinkId,
        commodity: CommodityId,
        splits: BTreeMap<LinkId, f64>,
    ) -> NetworkResult<()> {
        self.commodity(commodity)?;
        let l = self.link(link)?;
        if let Some(reason) = split_problem(l, &splits) {
            return Err(NetworkError::InvalidSplits { link, commodity, reason });
        }
        self.links[link.index()].splits.insert(commodity, splits);
        Ok(())
    }
}

/// Why `splits` are not a valid split-ratio set for `link`, if they are not.
pub(crate) fn split_problem(link: &Link, splits: &BTreeMap<LinkId, f64>) -> Option<String> {
    if let Some(bad) = splits.keys().find(|n| !link.outlink2lanegroups.contains_key(n)) {
        return Some(format!("{bad} is not an outlink of {}", link.id));
    }
    if let Some((n, r)) = splits.iter().find(|&(_, &r)| !(0.0..=1.0).contains(&r)) {
        return Some(format!("ratio {r} toward {n} is outside [0, 1]"));
    }
    let sum: f64 = splits.values().sum();
    if (sum - 1.0).abs() > SPLIT_SUM_TOL {
        return Some(format!("ratios sum to {sum}, expected 1"));
    }
    None
}
