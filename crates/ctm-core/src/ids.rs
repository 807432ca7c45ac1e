//! Typed arena indices.
//!
//! Every network element lives in a dense `Vec` owned by the crate that
//! defines it, and every relation between elements (a link's end node,
//! a lane group's lateral neighbor, an actuator's target) is one of these
//! ids rather than a pointer.  The inner `u32` is `pub` so callers can
//! index directly, but `.index()` reads better.

use std::fmt;

macro_rules! arena_ids {
    ($($(#[$attr:meta])* $name:ident;)+) => {$(
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(pub u32);

        impl $name {
            /// Not an element of any arena.
            pub const INVALID: $name = $name(u32::MAX);

            #[inline(always)]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl TryFrom<usize> for $name {
            type Error = std::num::TryFromIntError;
            fn try_from(n: usize) -> Result<$name, Self::Error> {
                u32::try_from(n).map($name)
            }
        }
    )+};
}

arena_ids! {
    /// A directed road link.
    LinkId;
    /// A junction between links.
    NodeId;
    /// A lane group.  Ids are global across links.
    LaneGroupId;
    /// A road connection from lane groups of one link to lane groups of the next.
    RoadConnectionId;
    /// A commodity (vehicle class).
    CommodityId;
    /// An ordered link sequence followed by pathfull commodities.
    PathId;
    DemandId;
    SensorId;
    ActuatorId;
    ControllerId;
}
