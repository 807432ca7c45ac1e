use thiserror::Error;

use ctm_control::ControlError;
use ctm_core::{ControllerId, CoreError, DemandId, SensorId, ValidationLog};
use ctm_demand::DemandError;
use ctm_dispatch::DispatchError;
use ctm_flow::FlowError;
use ctm_network::NetworkError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("simulation configuration error: {0}")]
    Config(String),

    /// Every problem found before the first step, reported together.
    #[error("scenario failed validation:\n{0}")]
    Validation(ValidationLog),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Demand(#[from] DemandError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("unknown demand {0}")]
    UnknownDemand(DemandId),

    #[error("unknown sensor {0}")]
    UnknownSensor(SensorId),

    #[error("unknown controller {0}")]
    UnknownController(ControllerId),
}

pub type SimResult<T> = Result<T, SimError>;
