//! HTTP façade.
//!
//! Operator CRUD over destinations, manual start/stop, source status and push
//! notifications, and the runtime log filter.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use server::{ApiServer, ApiServerConfig, AppState};
