//! `ctm-control` — sensors, actuators, and the controllers that close the loop.
//!
//! # Crate layout
//!
//! | Module           | Contents                                                   |
//! |------------------|------------------------------------------------------------|
//! | [`sensor`]       | `FixedSensor`, `Measurement`                               |
//! | [`actuator`]     | `Actuator`, `ActuatorKind`, `ActuatorTarget`, `Command`    |
//! | [`controller`]   | `Controller`, `ControllerKind`, `ControllerState`          |
//! | [`alinea`]       | `Alinea` — feedback ramp metering                          |
//! | [`profile_rate`] | `ProfileRate` — metering from a rate profile               |
//! | [`toll`]         | `TollLaneGroup`, `TollConfig` — HOT-lane restriction/toll  |
//! | [`signal`]       | `FixedTimeSignal`, `SignalStage`                           |
//! | [`context`]      | `ControlContext<'a>` — borrowed state for one poke         |
//! | [`error`]        | `ControlError`, `ControlResult<T>`                         |
//!
//! # Data flow
//!
//! ```text
//! sensor poke (prio 1)      ──▶ Measurement
//! controller poke (prio 2)  ──▶ Controller::command[actuator]
//! model update (prio 4)     ──▶ Actuator::apply(command) ──▶ FlowModel
//! ```
//!
//! Controllers never touch meter rates, restrictions, or signal state in
//! the flow model themselves; an actuator only picks up a new command at
//! the next model update.

pub mod actuator;
pub mod alinea;
pub mod context;
pub mod controller;
pub mod error;
pub mod profile_rate;
pub mod sensor;
pub mod signal;
pub mod toll;

#[cfg(test)]
mod tests;

pub use actuator::{Actuator, ActuatorKind, ActuatorTarget, Command};
pub use alinea::{Alinea, AlineaBinding};
pub use context::ControlContext;
pub use controller::{Controller, ControllerKind, ControllerState};
pub use error::{ControlError, ControlResult};
pub use profile_rate::ProfileRate;
pub use sensor::{FixedSensor, Measurement};
pub use signal::{FixedTimeSignal, SignalStage};
pub use toll::{TollConfig, TollLaneGroup};
