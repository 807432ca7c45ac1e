use thiserror::Error;

use ctm_core::{Key, LaneGroupId};
use ctm_network::NetworkError;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("lane group {0} has no flow state")]
    UnknownLaneGroup(LaneGroupId),

    #[error("{lanegroup} has no cell {cell}")]
    CellOutOfRange { lanegroup: LaneGroupId, cell: usize },

    #[error("vehicle count for {key} must be non-negative, got {veh}")]
    NegativeVehicles { key: Key, veh: f64 },
}

pub type FlowResult<T> = Result<T, FlowError>;
