//! Unit tests for ctm-network.

#[cfg(test)]
mod helpers {
    use ctm_core::{CommodityId, LinkId};
    use crate::{Network, NetworkBuilder, RoadParams};

    pub struct Diverge {
        pub net:     Network,
        pub main:    LinkId,
        pub through: LinkId,
        pub offramp: LinkId,
        pub car:     CommodityId,
    }

    /// A two-lane-group mainline that diverges:
    ///
    /// ```text
    ///            ┌── through (sink)
    ///  main ─────┤
    ///            └── offramp (sink)
    /// ```
    ///
    /// Both lane groups of `main` reach `through`; only the outer one reaches
    /// `offramp`.  The pathless commodity `car` splits 0.7 / 0.3.
    pub fn diverge() -> Diverge {
        let mut b = NetworkBuilder::new();
        let (n0, n1, n2, n3) = (b.add_node(), b.add_node(), b.add_node(), b.add_node());
        let main = b.add_link_with_lanegroups(n0, n1, 1_000.0, &[2, 1], RoadParams::default());
        let through = b.add_link(n1, n2, 1_000.0, 2, RoadParams::default());
        let offramp = b.add_link(n1, n3, 300.0, 1, RoadParams::new(900.0, 60.0, 120.0));
        b.connect(main, through);
        let outer = b.lanegroups_of(main)[1];
        let ramp_lg = b.lanegroups_of(offramp).to_vec();
        b.add_road_connection(main, vec![outer], offramp, ramp_lg);
        let car = b.add_commodity("car");
        b.set_splits(main, car, &[(through, 0.7), (offramp, 0.3)]);
        Diverge { net: b.build().unwrap(), main, through, offramp, car }
    }
}

// ── Builder & derived topology ────────────────────────────────────────────────

#[cfg(test)]
mod builder {
    use super::helpers::diverge;
    use crate::{ModelType, NetworkBuilder, RoadParams};

    #[test]
    fn source_and_sink_flags() {
        let d = diverge();
        assert!(d.net.links[d.main.index()].is_source);
        assert!(!d.net.links[d.main.index()].is_sink);
        assert!(d.net.links[d.through.index()].is_sink);
        assert!(d.net.links[d.offramp.index()].is_sink);
        assert_eq!(d.net.source_links().collect::<Vec<_>>(), vec![d.main]);
    }

    #[test]
    fn lateral_neighbors_and_lane_numbers() {
        let d = diverge();
        let main = &d.net.links[d.main.index()];
        assert_eq!(main.full_lanes, 3);
        let (inner, outer) = (main.lanegroups[0], main.lanegroups[1]);
        let lg_in = &d.net.lanegroups[inner.index()];
        let lg_out = &d.net.lanegroups[outer.index()];
        assert_eq!(lg_in.neighbor_in, None);
        assert_eq!(lg_in.neighbor_out, Some(outer));
        assert_eq!(lg_out.neighbor_in, Some(inner));
        assert_eq!(lg_out.neighbor_out, None);
        assert_eq!((lg_in.start_lane, lg_out.start_lane), (1, 3));
        assert_eq!(lg_out.length_m, 1_000.0);
    }

    #[test]
    fn outlink_lanegroups() {
        let d = diverge();
        let main = &d.net.links[d.main.index()];
        let (inner, outer) = (main.lanegroups[0], main.lanegroups[1]);
        assert_eq!(d.net.lanegroups_toward(d.main, d.through), &[inner, outer]);
        assert_eq!(d.net.lanegroups_toward(d.main, d.offramp), &[outer]);
        assert!(d.net.lanegroups_toward(d.through, d.offramp).is_empty());
        assert_eq!(d.net.lanegroups[inner.index()].outlinks, vec![d.through]);
        let rc = d.net.road_connection_toward(outer, d.offramp).unwrap();
        assert_eq!(rc.to_link, d.offramp);
        assert!(d.net.road_connection_toward(inner, d.offramp).is_none());
        assert_eq!(d.net.nodes[main.end_node.index()].road_connections.len(), 2);
    }

    #[test]
    fn model_type_defaults_to_ctm() {
        let mut b = NetworkBuilder::new();
        let (n0, n1) = (b.add_node(), b.add_node());
        let a = b.add_link(n0, n1, 100.0, 1, RoadParams::default());
        let net = b.build().unwrap();
        assert_eq!(net.links[a.index()].model_type, ModelType::Ctm);

        let mut b = NetworkBuilder::new();
        let (n0, n1) = (b.add_node(), b.add_node());
        let a = b.add_link(n0, n1, 100.0, 1, RoadParams::default());
        b.set_model_type(a, ModelType::ManyToOne);
        let net = b.build().unwrap();
        assert_eq!(net.links[a.index()].model_type, ModelType::ManyToOne);
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod validation {
    use ctm_core::NodeId;
    use crate::{NetworkBuilder, RoadParams};

    fn contains(log: &ctm_core::ValidationLog, needle: &str) -> bool {
        log.errors().iter().any(|e| e.contains(needle))
    }

    #[test]
    fn bad_road_params_and_length_are_all_reported() {
        let mut b = NetworkBuilder::new();
        let (n0, n1) = (b.add_node(), b.add_node());
        b.add_link(n0, n1, 0.0, 1, RoadParams::new(-1.0, 100.0, 100.0));
        let log = b.build().unwrap_err();
        assert_eq!(log.len(), 2);
        assert!(contains(&log, "length"));
        assert!(contains(&log, "capacity"));
    }

    #[test]
    fn jam_density_below_critical_is_rejected() {
        let mut b = NetworkBuilder::new();
        let (n0, n1) = (b.add_node(), b.add_node());
        // critical = 2000 / 50 = 40 veh/km
        b.add_link(n0, n1, 100.0, 1, RoadParams::new(2_000.0, 50.0, 30.0));
        assert!(contains(&b.build().unwrap_err(), "critical"));
    }

    #[test]
    fn unknown_node_is_rejected() {
        let mut b = NetworkBuilder::new();
        let n0 = b.add_node();
        b.add_link(n0, NodeId(9), 100.0, 1, RoadParams::default());
        assert!(contains(&b.build().unwrap_err(), "unknown NodeId(9)"));
    }

    #[test]
    fn road_connection_across_unrelated_nodes() {
        let mut b = NetworkBuilder::new();
        let (n0, n1, n2, n3) = (b.add_node(), b.add_node(), b.add_node(), b.add_node());
        let a = b.add_link(n0, n1, 100.0, 1, RoadParams::default());
        let c = b.add_link(n2, n3, 100.0, 1, RoadParams::default());
        b.connect(a, c);
        assert!(contains(&b.build().unwrap_err(), "does not end where"));
    }

    #[test]
    fn dead_end_without_connections() {
        let mut b = NetworkBuilder::new();
        let (n0, n1, n2) = (b.add_node(), b.add_node(), b.add_node());
        b.add_link(n0, n1, 100.0, 1, RoadParams::default());
        b.add_link(n1, n2, 100.0, 1, RoadParams::default());
        assert!(contains(&b.build().unwrap_err(), "no road connection"));
    }

    #[test]
    fn path_must_be_connected_and_end_at_sink() {
        let mut b = NetworkBuilder::new();
        let (n0, n1, n2) = (b.add_node(), b.add_node(), b.add_node());
        let a = b.add_link(n0, n1, 100.0, 1, RoadParams::default());
        let c = b.add_link(n1, n2, 100.0, 1, RoadParams::default());
        b.connect(a, c);
        let backwards = b.add_path(vec![c, a]);
        let short = b.add_path(vec![a]);
        b.add_pathfull_commodity("bus", vec![backwards, short]);
        let log = b.build().unwrap_err();
        assert!(contains(&log, "PathId(0): no road connection"));
        assert!(contains(&log, "PathId(1): must end on a sink"));
    }

    #[test]
    fn pathfull_commodity_needs_paths() {
        let mut b = NetworkBuilder::new();
        let (n0, n1) = (b.add_node(), b.add_node());
        b.add_link(n0, n1, 100.0, 1, RoadParams::default());
        b.add_pathfull_commodity("bus", vec![]);
        assert!(contains(&b.build().unwrap_err(), "has no paths"));
    }

    #[test]
    fn splits_must_sum_to_one() {
        let mut b = NetworkBuilder::new();
        let (n0, n1, n2, n3) = (b.add_node(), b.add_node(), b.add_node(), b.add_node());
        let a = b.add_link(n0, n1, 100.0, 1, RoadParams::default());
        let x = b.add_link(n1, n2, 100.0, 1, RoadParams::default());
        let y = b.add_link(n1, n3, 100.0, 1, RoadParams::default());
        b.connect(a, x);
        b.connect(a, y);
        let car = b.add_commodity("car");
        b.set_splits(a, car, &[(x, 0.5), (y, 0.2)]);
        assert!(contains(&b.build().unwrap_err(), "sum to"));
    }
}

// ── Routing ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod routing {
    use std::collections::BTreeMap;

    use ctm_core::{CommodityId, Key, LinkId, PathId};
    use super::helpers::diverge;
    use crate::{NetworkBuilder, NetworkError, Path, RoadParams};

    #[test]
    fn path_link_following() {
        let p = Path::new(PathId(0), vec![LinkId(4), LinkId(2), LinkId(7)]);
        assert_eq!(p.link_following(LinkId(4)), Some(LinkId(2)));
        assert_eq!(p.link_following(LinkId(2)), Some(LinkId(7)));
        assert_eq!(p.link_following(LinkId(7)), None);
        assert!(p.contains(LinkId(7)));
        assert!(!p.contains(LinkId(3)));
    }

    #[test]
    fn next_link_for_both_key_kinds() {
        let mut b = NetworkBuilder::new();
        let (n0, n1, n2) = (b.add_node(), b.add_node(), b.add_node());
        let a = b.add_link(n0, n1, 100.0, 1, RoadParams::default());
        let c = b.add_link(n1, n2, 100.0, 1, RoadParams::default());
        b.connect(a, c);
        let p = b.add_path(vec![a, c]);
        let bus = b.add_pathfull_commodity("bus", vec![p]);
        let net = b.build().unwrap();

        let k = Key::path(bus, p);
        assert_eq!(net.next_link(a, k).unwrap(), Some(c));
        assert_eq!(net.next_link(c, k).unwrap(), None);

        let car = CommodityId(7);
        assert_eq!(net.next_link(a, Key::next_link(car, c)).unwrap(), Some(c));
        assert_eq!(net.next_link(c, Key::next_link(car, c)).unwrap(), None);
    }

    #[test]
    fn unknown_path_is_an_error() {
        let d = diverge();
        let err = d.net.next_link(d.main, Key::path(d.car, PathId(0))).unwrap_err();
        assert!(matches!(err, NetworkError::PathNotFound(PathId(0))));
    }

    #[test]
    fn lanegroup_reachability() {
        let d = diverge();
        let main = &d.net.links[d.main.index()];
        let (inner, outer) = (main.lanegroups[0], main.lanegroups[1]);
        let to_ramp = Key::next_link(d.car, d.offramp);
        assert!(!d.net.lanegroup_reaches(inner, to_ramp).unwrap());
        assert!(d.net.lanegroup_reaches(outer, to_ramp).unwrap());
        let ramp_lg = d.net.links[d.offramp.index()].lanegroups[0];
        assert!(d.net.lanegroup_reaches(ramp_lg, Key::next_link(d.car, d.offramp)).unwrap());
    }

    #[test]
    fn pathless_targets() {
        let d = diverge();
        let targets = d.net.pathless_targets(d.main, d.car).unwrap();
        assert_eq!(targets, vec![(d.through, 0.7), (d.offramp, 0.3)]);
        assert_eq!(d.net.pathless_targets(d.through, d.car).unwrap(), vec![(d.through, 1.0)]);
    }

    #[test]
    fn missing_splits_at_diverge() {
        let d = diverge();
        let err = d.net.pathless_targets(d.main, CommodityId(3)).unwrap_err();
        assert!(matches!(err, NetworkError::MissingSplits { .. }));
    }

    #[test]
    fn negligible_ratios_are_dropped() {
        let mut d = diverge();
        let splits = BTreeMap::from([(d.through, 1.0 - 5e-5), (d.offramp, 5e-5)]);
        d.net.set_splits(d.main, d.car, splits).unwrap();
        let targets = d.net.pathless_targets(d.main, d.car).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].0, d.through);
    }

    #[test]
    fn set_splits_rejects_non_outlinks() {
        let mut d = diverge();
        let splits = BTreeMap::from([(d.main, 1.0)]);
        let err = d.net.set_splits(d.main, d.car, splits).unwrap_err();
        assert!(matches!(err, NetworkError::InvalidSplits { .. }));
    }
}
