use thiserror::Error;

use ctm_core::{CommodityId, LinkId};
use ctm_dispatch::DispatchError;
use ctm_network::NetworkError;

#[derive(Debug, Error)]
pub enum DemandError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("pathfull {commodity} needs a path for its demand on {link}")]
    PathRequired { commodity: CommodityId, link: LinkId },

    #[error("no lane group of {link} leads to {next}")]
    NoLaneGroups { link: LinkId, next: LinkId },

    #[error("demand parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DemandResult<T> = Result<T, DemandError>;
