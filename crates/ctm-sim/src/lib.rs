//! `ctm-sim` — event-driven orchestrator for the CTM traffic simulation.
//!
//! # One instant of simulated time
//!
//! ```text
//! events at t, in priority order:
//!   ① DemandChange      — a source picks up its next profile value and
//!                          re-splits it over its lane groups.
//!   ② PokeSensor        — a sensor samples vehicles and flow on its link.
//!   ③ PokeController    — a controller reads sensors and links and publishes
//!                          one command per actuator.
//!   ④ PokeLaneSelector  — a polled logit selector caches lane densities.
//!   ⑤ ModelUpdate       — actuators apply commands, sources inject, every
//!                          lane group advances one step; the next update is
//!                          queued at t + sim_dt.
//! ```
//!
//! Every element reschedules itself, so the dispatcher's queue is the whole
//! control flow.  Two runs of the same scenario fire the same events in the
//! same order and end in the same state.
//!
//! # Cargo features
//!
//! | Feature    | Effect                                                    |
//! |------------|-----------------------------------------------------------|
//! | `parallel` | Supply/demand phase of each step on Rayon's thread pool.  |
//! | `serde`    | Serde derives on `SimConfig` and the network types.       |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use ctm_core::SimConfig;
//! use ctm_demand::load_demands_csv;
//! use ctm_sim::{NoopObserver, SimBuilder};
//!
//! let demands = load_demands_csv(path, &net)?;
//! let mut sim = SimBuilder::new(SimConfig::default(), net)
//!     .demands(demands)
//!     .build()?;
//! sim.run(&mut NoopObserver)?;
//! ```

pub mod builder;
pub mod error;
pub mod observer;
pub mod sim;


pub use builder::SimBuilder;
pub use error::{SimError, SimResult};
pub use observer::{NoopObserver, SimObserver};
pub use sim::Sim;
