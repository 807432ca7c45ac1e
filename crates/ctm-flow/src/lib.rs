//! `ctm-flow` — the cell transmission flow model.
//!
//! # Crate layout
//!
//! | Module            | Contents                                                  |
//! |-------------------|-----------------------------------------------------------|
//! | [`cell`]          | `Cell` — per-key vehicles, demand, supply of one segment  |
//! | [`lanegroup`]     | `FluidLaneGroup`, `Restriction`                           |
//! | [`lane_selector`] | `LaneSelector` (`Keep`, `Logit`), `LaneChoice`            |
//! | [`accumulator`]   | `FlowAccumulator` — cumulative entry/exit counts          |
//! | [`model`]         | `FlowModel` — the network-wide step                       |
//! | [`error`]         | `FlowError`, `FlowResult<T>`                              |
//!
//! # Units
//!
//! Inside this crate everything is per simulation step: vehicles per step,
//! and speeds in cells per step.  Conversion from veh/h, km/h and veh/km
//! happens once in [`Cell::set_road_params`].
//!
//! # Feature flags
//!
//! | Flag       | Effect                                                      |
//! |------------|-------------------------------------------------------------|
//! | `parallel` | Runs the supply/demand phase over lane groups with Rayon.   |

pub mod accumulator;
pub mod cell;
pub mod error;
pub mod lane_selector;
pub mod lanegroup;
pub mod model;


pub use accumulator::FlowAccumulator;
pub use cell::{Cell, KeyFlows};
pub use error::{FlowError, FlowResult};
pub use lane_selector::{LaneChoice, LaneDensities, LaneOptions, LaneSelector, LogitSelector};
pub use lanegroup::{FluidLaneGroup, Restriction};
pub use model::{FlowModel, Injections, StepReport};
