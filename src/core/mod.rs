//! Core types and utilities

pub mod types;
pub mod error;
pub mod logging;
pub mod viewer;

pub use types::*;
pub use error::Error;
pub use viewer::{Viewer, ViewerId, RollTracker};
