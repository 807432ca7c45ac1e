//! Commodities (vehicle classes) and the paths pathfull commodities follow.

use rustc_hash::FxHashMap;

use ctm_core::{CommodityId, LinkId, PathId};

/// A vehicle class.
///
/// Pathfull commodities are routed along explicit [`Path`]s and their flow
/// is keyed by path.  Pathless commodities are routed by per-link split
/// ratios and their flow is keyed by the next link.
#[derive(Clone, Debug)]
pub struct Commodity {
    pub id:       CommodityId,
    pub name:     String,
    pub pathfull: bool,
    pub paths:    Vec<PathId>,
}

/// An ordered, contiguous sequence of links.
#[derive(Clone, Debug)]
pub struct Path {
    pub id:    PathId,
    pub links: Vec<LinkId>,
    next:      FxHashMap<LinkId, LinkId>,
}

impl Path {
    pub fn new(id: PathId, links: Vec<LinkId>) -> Self {
        let next = links.windows(2).map(|w| (w[0], w[1])).collect();
        Self { id, links, next }
    }

    /// The link after `link` on this path; `None` for the last link or a
    /// link not on the path.
    #[inline]
    pub fn link_following(&self, link: LinkId) -> Option<LinkId> {
        self.next.get(&link).copied()
    }

    pub fn contains(&self, link: LinkId) -> bool {
        self.last_link() == Some(link) || self.next.contains_key(&link)
    }

    pub fn first_link(&self) -> Option<LinkId> {
        self.links.first().copied()
    }

    pub fn last_link(&self) -> Option<LinkId> {
        self.links.last().copied()
    }
}
