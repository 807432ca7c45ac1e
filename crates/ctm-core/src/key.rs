//! `Key`: the partition of flow used as map key throughout the solver.
//!
//! A vehicle in the fluid model is never tracked individually.  What the
//! solver does track is *which* flow a quantity of vehicles belongs to:
//!
//! ```text
//! (commodity, path)        for pathfull commodities  (is_path = true)
//! (commodity, next link)   for pathless commodities  (is_path = false)
//! ```
//!
//! Pathless keys are re-targeted every time flow crosses a node, using the
//! downstream link's split ratios.  Path keys never change.

use std::fmt;

use crate::{CommodityId, LinkId, PathId};

/// Immutable flow partition: `(commodity, path-or-next-link, is_path)`.
///
/// Equality and hashing use all three fields, so a path and a link that
/// happen to share the same integer id never collide.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Key {
    pub commodity: CommodityId,
    /// A `PathId` when `is_path`, else a `LinkId`.
    pub target:    u32,
    pub is_path:   bool,
}

impl Key {
    /// Key for a pathfull commodity travelling along `path`.
    #[inline]
    pub const fn path(commodity: CommodityId, path: PathId) -> Key {
        Key { commodity, target: path.0, is_path: true }
    }

    /// Key for a pathless commodity whose next link is `next_link`.
    ///
    /// On a sink link the next link is the sink link itself.
    #[inline]
    pub const fn next_link(commodity: CommodityId, next_link: LinkId) -> Key {
        Key { commodity, target: next_link.0, is_path: false }
    }

    #[inline]
    pub fn path_id(self) -> Option<PathId> {
        self.is_path.then_some(PathId(self.target))
    }

    #[inline]
    pub fn next_link_id(self) -> Option<LinkId> {
        (!self.is_path).then_some(LinkId(self.target))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_path {
            write!(f, "({}, path {})", self.commodity, self.target)
        } else {
            write!(f, "({}, next link {})", self.commodity, self.target)
        }
    }
}
