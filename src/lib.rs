//! Ringfield - streamed, procedurally generated debris for planetary rings
//!
//! Space around each viewer is divided into cubic cells at several octaves.
//! Visible cells are backed by pooled chunk records that are filled by
//! deterministic rejection sampling against the ring's density profile, a
//! bounded number of samples per frame.

pub mod core;
pub mod math;
pub mod ring;
pub mod streaming;
pub mod query;
pub mod render;
pub mod engine;

pub use engine::RingEngine;
