//! `ctm-demand` — exogenous flow entering the network.
//!
//! # Crate layout
//!
//! | Module        | Contents                                               |
//! |---------------|--------------------------------------------------------|
//! | [`generator`] | `DemandGenerator` — profile, current rate, lane split  |
//! | [`loader`]    | `load_demands_csv`, `load_demands_reader`, `DemandSpec` |
//! | [`error`]     | `DemandError`, `DemandResult<T>`                       |
//!
//! # Rate changes
//!
//! A generator's profile is in veh/h.  Each breakpoint becomes one
//! `DemandChange` event carrying the new rate in veh/s; firing it calls
//! [`DemandGenerator::set_demand_vps`], which recomputes the whole split of
//! the per-step volume over lane groups and keys, then schedules the next
//! breakpoint.

pub mod error;
pub mod generator;
pub mod loader;


pub use error::{DemandError, DemandResult};
pub use generator::DemandGenerator;
pub use loader::{DemandSpec, load_demands_csv, load_demands_reader};
