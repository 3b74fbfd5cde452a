//! restreamer: keeps re-broadcast pipelines in step with an upstream live source.
//!
//! When the source goes live every enabled destination gets an encoding channel
//! started; when it goes offline the running ones are stopped.

pub mod api;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod reconciler;
pub mod services;
pub mod source;

pub use error::{Error, Result};
