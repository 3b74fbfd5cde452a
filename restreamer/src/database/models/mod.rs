//! Database row models.

pub mod destination;
pub mod source_state;

pub use destination::*;
pub use source_state::*;
