//! `ctm-core` — foundational types for the CTM traffic simulation workspace.
//!
//! This crate is a dependency of every other `ctm-*` crate.  It has no
//! `ctm-*` dependencies and a single required external one (`thiserror`),
//! plus optional `serde`.
//!
//! # What lives here
//!
//! | Module      | Contents                                                     |
//! |-------------|--------------------------------------------------------------|
//! | [`ids`]     | `LinkId`, `NodeId`, `LaneGroupId`, `CommodityId`, `PathId`, … |
//! | [`time`]    | `SimTime`, `SimConfig`                                       |
//! | [`key`]     | `Key` — the (commodity, path-or-next-link) flow partition    |
//! | [`profile`] | `Profile1D` (piecewise-constant), `LookupTable` (linear)     |
//! | [`error`]   | `CoreError`, `CoreResult`, `ValidationLog`                   |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                     |
//! |---------|------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public types.        |

pub mod error;
pub mod ids;
pub mod key;
pub mod profile;
pub mod time;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{CoreError, CoreResult, ValidationLog};
pub use ids::{
    ActuatorId, CommodityId, ControllerId, DemandId, LaneGroupId, LinkId, NodeId, PathId,
    RoadConnectionId, SensorId,
};
pub use key::Key;
pub use profile::{LookupTable, Profile1D};
pub use time::{SimConfig, SimTime};

/// Vehicle counts below this are treated as an empty cell.
pub const EPSILON: f64 = 1e-4;
