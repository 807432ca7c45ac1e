use ctm_core::SimTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("event at {timestamp} registered in the past (current time {now})")]
    EventInPast { timestamp: SimTime, now: SimTime },
}

pub type DispatchResult<T> = Result<T, DispatchError>;
