//! Runtime lookup errors for `ctm-network`.
//!
//! Configuration problems (bad ids at build time, non-contiguous paths,
//! split ratios that do not sum to one) never surface here; the builder
//! collects those into a `ValidationLog`.

use thiserror::Error;

use ctm_core::{CommodityId, LaneGroupId, LinkId, NodeId, PathId, RoadConnectionId};

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("link {0} not found in network")]
    LinkNotFound(LinkId),

    #[error("node {0} not found in network")]
    NodeNotFound(NodeId),

    #[error("lane group {0} not found in network")]
    LaneGroupNotFound(LaneGroupId),

    #[error("road connection {0} not found in network")]
    RoadConnectionNotFound(RoadConnectionId),

    #[error("commodity {0} not found in network")]
    CommodityNotFound(CommodityId),

    #[error("path {0} not found in network")]
    PathNotFound(PathId),

    #[error("{path} does not contain {link}")]
    LinkNotOnPath { path: PathId, link: LinkId },

    #[error("{commodity} has no split ratios on {link}, which has several outlinks")]
    MissingSplits { link: LinkId, commodity: CommodityId },

    #[error("invalid split ratios for {commodity} on {link}: {reason}")]
    InvalidSplits { link: LinkId, commodity: CommodityId, reason: String },
}

pub type NetworkResult<T> = Result<T, NetworkError>;
