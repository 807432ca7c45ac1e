//! Incremental construction of a [`Network`].

use std::collections::{BTreeMap, BTreeSet};

use log::info;

use ctm_core::{
    CommodityId, LaneGroupId, LinkId, NodeId, PathId, RoadConnectionId, ValidationLog,
};

use crate::network::split_problem;
use crate::{Commodity, LaneGroup, Link, ModelType, Network, Node, Path, RoadConnection, RoadParams};

/// Construct a [`Network`] incrementally, then call [`build`](Self::build).
///
/// Ids are handed out sequentially as elements are added.  Nothing is
/// checked until `build()`, which derives adjacency (node in/out links,
/// source and sink flags, lateral neighbors, per-lane-group outlinks) and
/// collects every configuration problem into one [`ValidationLog`].
///
/// # Example
///
/// ```
/// use ctm_network::{NetworkBuilder, RoadParams};
///
/// let mut b = NetworkBuilder::new();
/// let (n0, n1, n2) = (b.add_node(), b.add_node(), b.add_node());
/// let up   = b.add_link(n0, n1, 500.0, 2, RoadParams::default());
/// let down = b.add_link(n1, n2, 500.0, 2, RoadParams::default());
/// b.connect(up, down);
/// let net = b.build().unwrap();
/// assert!(net.links[up.index()].is_source);
/// assert!(net.links[down.index()].is_sink);
/// ```
#[derive(Default)]
pub struct NetworkBuilder {
    node_count:  usize,
    links:       Vec<RawLink>,
    lanegroups:  Vec<RawLaneGroup>,
    connections: Vec<RawConnection>,
    commodities: Vec<RawCommodity>,
    paths:       Vec<Vec<LinkId>>,
    splits:      Vec<(LinkId, CommodityId, BTreeMap<LinkId, f64>)>,
}

struct RawLink {
    start:       NodeId,
    end:         NodeId,
    length_m:    f64,
    road_params: RoadParams,
    model_type:  ModelType,
    lanegroups:  Vec<LaneGroupId>,
}

struct RawLaneGroup {
    link:      LinkId,
    num_lanes: u32,
}

struct RawConnection {
    from_link:       LinkId,
    from_lanegroups: Vec<LaneGroupId>,
    to_link:         LinkId,
    to_lanegroups:   Vec<LaneGroupId>,
}

struct RawCommodity {
    name:     String,
    pathfull: bool,
    paths:    Vec<PathId>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self) -> NodeId {
        let id = NodeId(self.node_count as u32);
        self.node_count += 1;
        id
    }

    /// Add a link with a single lane group spanning all `lanes`.
    pub fn add_link(
        &mut self,
        start: NodeId,
        end: NodeId,
        length_m: f64,
        lanes: u32,
        road_params: RoadParams,
    ) -> LinkId {
        self.add_link_with_lanegroups(start, end, length_m, &[lanes], road_params)
    }

    /// Add a link whose lanes are split into lane groups, inner → outer.
    /// `lanegroup_lanes[i]` is the lane count of the i-th group.
    pub fn add_link_with_lanegroups(
        &mut self,
        start: NodeId,
        end: NodeId,
        length_m: f64,
        lanegroup_lanes: &[u32],
        road_params: RoadParams,
    ) -> LinkId {
        let id = LinkId(self.links.len() as u32);
        let lanegroups = lanegroup_lanes
            .iter()
            .map(|&num_lanes| {
                let lg = LaneGroupId(self.lanegroups.len() as u32);
                self.lanegroups.push(RawLaneGroup { link: id, num_lanes });
                lg
            })
            .collect();
        self.links.push(RawLink {
            start,
            end,
            length_m,
            road_params,
            model_type: ModelType::Ctm,
            lanegroups,
        });
        id
    }

    /// Lane groups of a link added earlier, inner → outer.
    pub fn lanegroups_of(&self, link: LinkId) -> &[LaneGroupId] {
        self.links.get(link.index()).map(|l| l.lanegroups.as_slice()).unwrap_or(&[])
    }

    pub fn set_model_type(&mut self, link: LinkId, model_type: ModelType) {
        if let Some(l) = self.links.get_mut(link.index()) {
            l.model_type = model_type;
        }
    }

    /// Connect every lane group of `from` to every lane group of `to`.
    pub fn connect(&mut self, from: LinkId, to: LinkId) -> RoadConnectionId {
        let from_lgs = self.lanegroups_of(from).to_vec();
        let to_lgs = self.lanegroups_of(to).to_vec();
        self.add_road_connection(from, from_lgs, to, to_lgs)
    }

    pub fn add_road_connection(
        &mut self,
        from_link: LinkId,
        from_lanegroups: Vec<LaneGroupId>,
        to_link: LinkId,
        to_lanegroups: Vec<LaneGroupId>,
    ) -> RoadConnectionId {
        let id = RoadConnectionId(self.connections.len() as u32);
        self.connections.push(RawConnection { from_link, from_lanegroups, to_link, to_lanegroups });
        id
    }

    pub fn add_path(&mut self, links: Vec<LinkId>) -> PathId {
        let id = PathId(self.paths.len() as u32);
        self.paths.push(links);
        id
    }

    /// Add a commodity routed by split ratios.
    pub fn add_commodity(&mut self, name: impl Into<String>) -> CommodityId {
        self.push_commodity(name.into(), false, Vec::new())
    }

    /// Add a commodity routed along `paths`.
    pub fn add_pathfull_commodity(
        &mut self,
        name: impl Into<String>,
        paths: Vec<PathId>,
    ) -> CommodityId {
        self.push_commodity(name.into(), true, paths)
    }

    fn push_commodity(&mut self, name: String, pathfull: bool, paths: Vec<PathId>) -> CommodityId {
        let id = CommodityId(self.commodities.len() as u32);
        self.commodities.push(RawCommodity { name, pathfull, paths });
        id
    }

    /// Split ratios of pathless `commodity` leaving `link`.
    pub fn set_splits(&mut self, link: LinkId, commodity: CommodityId, splits: &[(LinkId, f64)]) {
        self.splits.push((link, commodity, splits.iter().copied().collect()));
    }

    // ── Build ─────────────────────────────────────────────────────────────

    /// Consume the builder and produce a validated [`Network`].
    pub fn build(self) -> Result<Network, ValidationLog> {
        let mut log = ValidationLog::new();
        let n_nodes = self.node_count;
        let n_links = self.links.len();

        let mut nodes: Vec<Node> = (0..n_nodes)
            .map(|i| Node {
                id:               NodeId(i as u32),
                in_links:         Vec::new(),
                out_links:        Vec::new(),
                road_connections: Vec::new(),
            })
            .collect();

        // Links and node adjacency.
        let mut links: Vec<Link> = Vec::with_capacity(n_links);
        for (i, raw) in self.links.into_iter().enumerate() {
            let id = LinkId(i as u32);
            for node in [raw.start, raw.end] {
                if node.index() >= n_nodes {
                    log.add_error(format!("{id}: unknown {node}"));
                }
            }
            if let Some(n) = nodes.get_mut(raw.start.index()) {
                n.out_links.push(id);
            }
            if let Some(n) = nodes.get_mut(raw.end.index()) {
                n.in_links.push(id);
            }
            if !(raw.length_m > 0.0) {
                log.add_error(format!("{id}: length must be positive, got {}", raw.length_m));
            }
            for p in raw.road_params.problems() {
                log.add_error(format!("{id}: {p}"));
            }
            if raw.lanegroups.is_empty() {
                log.add_error(format!("{id}: has no lane groups"));
            }
            let full_lanes = raw
                .lanegroups
                .iter()
                .map(|lg| self.lanegroups[lg.index()].num_lanes)
                .sum();
            links.push(Link {
                id,
                start_node: raw.start,
                end_node: raw.end,
                length_m: raw.length_m,
                full_lanes,
                road_params: raw.road_params,
                model_type: raw.model_type,
                is_source: false,
                is_sink: false,
                lanegroups: raw.lanegroups,
                outlink2lanegroups: BTreeMap::new(),
                splits: BTreeMap::new(),
            });
        }
        for link in &mut links {
            link.is_source = nodes.get(link.start_node.index()).is_some_and(|n| n.in_links.is_empty());
            link.is_sink = nodes.get(link.end_node.index()).is_some_and(|n| n.out_links.is_empty());
        }

        // Lane groups and lateral neighbors.
        let mut lanegroups: Vec<LaneGroup> = Vec::with_capacity(self.lanegroups.len());
        for (i, raw) in self.lanegroups.iter().enumerate() {
            let id = LaneGroupId(i as u32);
            if raw.num_lanes == 0 {
                log.add_error(format!("{id}: has zero lanes"));
            }
            let link = &links[raw.link.index()];
            let pos = link.lanegroups.iter().position(|&lg| lg == id).unwrap_or(0);
            let start_lane = 1 + link.lanegroups[..pos]
                .iter()
                .map(|lg| self.lanegroups[lg.index()].num_lanes)
                .sum::<u32>();
            lanegroups.push(LaneGroup {
                id,
                link: raw.link,
                num_lanes: raw.num_lanes,
                start_lane,
                length_m: link.length_m,
                neighbor_in: pos.checked_sub(1).map(|p| link.lanegroups[p]),
                neighbor_out: link.lanegroups.get(pos + 1).copied(),
                road_connections: Vec::new(),
                outlinks: Vec::new(),
            });
        }

        // Road connections.
        let mut road_connections = Vec::with_capacity(self.connections.len());
        for (i, raw) in self.connections.into_iter().enumerate() {
            let id = RoadConnectionId(i as u32);
            let (Some(from), Some(to)) = (links.get(raw.from_link.index()), links.get(raw.to_link.index()))
            else {
                log.add_error(format!("{id}: unknown link {} or {}", raw.from_link, raw.to_link));
                continue;
            };
            if from.end_node != to.start_node {
                log.add_error(format!(
                    "{id}: {} does not end where {} starts",
                    raw.from_link, raw.to_link
                ));
                continue;
            }
            if raw.from_lanegroups.is_empty() || raw.to_lanegroups.is_empty() {
                log.add_error(format!("{id}: connects no lane groups"));
                continue;
            }
            let foreign = |lgs: &[LaneGroupId], owner: &Link| {
                lgs.iter().copied().find(|lg| !owner.lanegroups.contains(lg))
            };
            if let Some(lg) = foreign(&raw.from_lanegroups, from).or(foreign(&raw.to_lanegroups, to)) {
                log.add_error(format!("{id}: {lg} is not on the connected links"));
                continue;
            }
            road_connections.push(RoadConnection {
                id,
                from_link: raw.from_link,
                from_lanegroups: raw.from_lanegroups,
                to_link: raw.to_link,
                to_lanegroups: raw.to_lanegroups,
            });
        }
        if log.has_errors() {
            return Err(log);
        }
        for rc in &road_connections {
            nodes[links[rc.from_link.index()].end_node.index()].road_connections.push(rc.id);
            let from_link = &mut links[rc.from_link.index()];
            let feeding = from_link.outlink2lanegroups.entry(rc.to_link).or_default();
            for &lg in &rc.from_lanegroups {
                if !feeding.contains(&lg) {
                    feeding.push(lg);
                }
                let lane_group = &mut lanegroups[lg.index()];
                lane_group.road_connections.push(rc.id);
                if !lane_group.outlinks.contains(&rc.to_link) {
                    lane_group.outlinks.push(rc.to_link);
                }
            }
        }
        for link in &links {
            if !link.is_sink && link.outlink2lanegroups.is_empty() {
                log.add_error(format!("{}: no road connection to any downstream link", link.id));
            }
        }

        // Paths.
        let paths: Vec<Path> = self
            .paths
            .into_iter()
            .enumerate()
            .map(|(i, p)| Path::new(PathId(i as u32), p))
            .collect();
        for path in &paths {
            validate_path(path, &links, &mut log);
        }

        // Commodities.
        let commodities: Vec<Commodity> = self
            .commodities
            .into_iter()
            .enumerate()
            .map(|(i, raw)| Commodity {
                id:       CommodityId(i as u32),
                name:     raw.name,
                pathfull: raw.pathfull,
                paths:    raw.paths,
            })
            .collect();
        for c in &commodities {
            if c.pathfull && c.paths.is_empty() {
                log.add_error(format!("{}: pathfull commodity has no paths", c.id));
            }
            for p in c.paths.iter().filter(|p| p.index() >= paths.len()) {
                log.add_error(format!("{}: unknown {p}", c.id));
            }
        }

        // Split ratios.
        for (link, commodity, splits) in self.splits {
            let Some(l) = links.get_mut(link.index()) else {
                log.add_error(format!("splits: unknown {link}"));
                continue;
            };
            match commodities.get(commodity.index()) {
                None => log.add_error(format!("splits on {link}: unknown {commodity}")),
                Some(c) if c.pathfull => {
                    log.add_error(format!("splits on {link}: {commodity} is pathfull"))
                }
                Some(_) => match split_problem(l, &splits) {
                    Some(reason) => log.add_error(format!("splits for {commodity} on {link}: {reason}")),
                    None => {
                        l.splits.insert(commodity, splits);
                    }
                },
            }
        }

        if log.has_errors() {
            return Err(log);
        }
        info!(
            "network built: {} nodes, {} links, {} lane groups, {} commodities",
            nodes.len(),
            links.len(),
            lanegroups.len(),
            commodities.len()
        );
        Ok(Network { nodes, links, lanegroups, road_connections, commodities, paths })
    }
}

fn validate_path(path: &Path, links: &[Link], log: &mut ValidationLog) {
    let id = path.id;
    if path.links.is_empty() {
        log.add_error(format!("{id}: empty"));
        return;
    }
    let mut seen = BTreeSet::new();
    for &l in &path.links {
        if l.index() >= links.len() {
            log.add_error(format!("{id}: unknown {l}"));
            return;
        }
        if !seen.insert(l) {
            log.add_error(format!("{id}: visits {l} twice"));
            return;
        }
    }
    for w in path.links.windows(2) {
        if !links[w[0].index()].outlink2lanegroups.contains_key(&w[1]) {
            log.add_error(format!("{id}: no road connection from {} to {}", w[0], w[1]));
        }
    }
    if let Some(last) = path.last_link() {
        if !links[last.index()].is_sink {
            log.add_error(format!("{id}: must end on a sink link, {last} is not one"));
        }
    }
}
