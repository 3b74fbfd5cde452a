//! Domain layer for the restreamer.
//!
//! Destinations, their runtime status machine, the upstream source state and the
//! observed state of external encoding channels.

pub mod channel;
pub mod destination;
pub mod source;

pub use channel::{ChannelState, StartDecision};
pub use destination::{
    Destination, DestinationStatus, DestinationUpdate, Platform, StreamKey, VerticalMode,
};
pub use source::SourceState;
