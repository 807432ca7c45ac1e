//! The demo corridor.
//!
//! ```text
//!   up (1 km, 3 lanes) ──┐
//!                        ├─▶ ml (1 km, 3 lanes) ──▶ down (2 km, 2 lanes)
//!   ramp (300 m, 1 lane) ┘
//! ```
//!
//! `down` drops a lane, so heavy mainline demand backs up through `ml`
//! into `up`.  Every link uses 1800 veh/h/lane, 100 km/h, 100 veh/km/lane.

use ctm_core::LinkId;
use ctm_network::{Network, NetworkBuilder, RoadParams};

pub struct Corridor {
    pub net:  Network,
    pub up:   LinkId,
    pub ramp: LinkId,
    pub ml:   LinkId,
    pub down: LinkId,
}

pub fn build_corridor() -> Result<Corridor, ctm_core::ValidationLog> {
    let road = RoadParams::default();
    let mut b = NetworkBuilder::new();
    let (n0, n1, n2, n3, n4) = (b.add_node(), b.add_node(), b.add_node(), b.add_node(), b.add_node());
    let up = b.add_link(n0, n1, 1_000.0, 3, road);
    let ramp = b.add_link(n4, n1, 300.0, 1, road);
    let ml = b.add_link(n1, n2, 1_000.0, 3, road);
    let down = b.add_link(n2, n3, 2_000.0, 2, road);
    b.connect(up, ml);
    b.connect(ramp, ml);
    b.connect(ml, down);
    b.add_commodity("car");
    Ok(Corridor { net: b.build()?, up, ramp, ml, down })
}
