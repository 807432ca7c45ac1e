//! `ctm-network` — static road topology for the CTM flow model.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                    |
//! |---------------|-------------------------------------------------------------|
//! | [`road`]      | `RoadParams`, `ModelType`                                   |
//! | [`network`]   | `Network`, `Node`, `Link`, `LaneGroup`, `RoadConnection`    |
//! | [`commodity`] | `Commodity`, `Path`                                         |
//! | [`builder`]   | `NetworkBuilder` (derives adjacency, validates on `build`)  |
//! | [`error`]     | `NetworkError`, `NetworkResult<T>`                          |
//!
//! Everything here is topology: which lane groups exist, what they connect
//! to, and how pathless flow splits at diverges.  Vehicle state lives in
//! `ctm-flow`, keyed by the same `LaneGroupId`s.
//!
//! # Lane numbering
//!
//! A link's lane groups are ordered inner → outer.  Lane group `i` has
//! `neighbor_in = i-1` and `neighbor_out = i+1` on the same link; lateral
//! flow (lane changing) only happens between these neighbors.
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                       |
//! |---------|--------------------------------------------------------------|
//! | `serde` | Derives `Serialize`/`Deserialize` on `RoadParams`/`ModelType`. |

pub mod builder;
pub mod commodity;
pub mod error;
pub mod network;
pub mod road;

#[cfg(test)]
mod tests;

pub use builder::NetworkBuilder;
pub use commodity::{Commodity, Path};
pub use error::{NetworkError, NetworkResult};
pub use network::{LaneGroup, Link, Network, Node, RoadConnection};
pub use road::{ModelType, RoadParams};
