//! Restream destination entity and its status machine.

mod entity;
mod state;

pub use entity::{Destination, DestinationUpdate, Platform, StreamKey, VerticalMode};
pub use state::DestinationStatus;
