//! Repository layer for database access.
//!
//! Traits describe what the reconciler and the HTTP layer need from storage;
//! the `Sqlx*` types implement them against SQLite.

pub mod destination;
pub mod source_state;

pub use destination::*;
pub use source_state::*;
