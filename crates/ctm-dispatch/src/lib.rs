//! `ctm-dispatch` — the event kernel that drives simulated time.
//!
//! # Crate layout
//!
//! | Module         | Contents                                               |
//! |----------------|--------------------------------------------------------|
//! | [`event`]      | `Event`, `Action`, `ActionKind`, `Recipient`, priorities |
//! | [`dispatcher`] | `Dispatcher` (`BTreeMap<(time, priority, seq), Event>`) |
//! | [`error`]      | `DispatchError`, `DispatchResult<T>`                   |
//!
//! # Ordering model (summary)
//!
//! ```text
//! events fire in ascending (timestamp, priority, insertion seq)
//! current_time = timestamp of the event being fired
//! an event may register follow-ups at timestamps ≥ current_time
//! ```
//!
//! Actions are plain data.  The dispatcher never executes anything itself;
//! the owner of the network state pops events and matches on
//! [`Action`], as `ctm_sim::Sim` does.

pub mod dispatcher;
pub mod error;
pub mod event;

#[cfg(test)]
mod tests;

pub use dispatcher::Dispatcher;
pub use error::{DispatchError, DispatchResult};
pub use event::{Action, ActionKind, Event, Recipient, priority};
