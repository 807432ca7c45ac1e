use thiserror::Error;

use ctm_core::{ActuatorId, ControllerId, SensorId};
use ctm_dispatch::DispatchError;
use ctm_flow::FlowError;
use ctm_network::NetworkError;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("unknown actuator {0}")]
    UnknownActuator(ActuatorId),

    #[error("unknown sensor {0}")]
    UnknownSensor(SensorId),

    #[error("{actuator} cannot take a {command} command")]
    CommandMismatch { actuator: ActuatorId, command: &'static str },

    #[error("{actuator} has a target its kind cannot drive")]
    TargetMismatch { actuator: ActuatorId },

    #[error("{controller}: {reason}")]
    Config { controller: ControllerId, reason: String },
}

pub type ControlResult<T> = Result<T, ControlError>;
