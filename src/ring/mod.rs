//! Ring description: parameters, radial profile and drift.
//!
//! Everything here is immutable for the duration of a frame and shared
//! read-only with the streaming pipeline.

pub mod config;
pub mod drift;
pub mod profile;

pub use config::{RingConfig, RingShape, StreamingConfig, PoolConfig, DriftConfig, SearchConfig, RenderConfig};
pub use drift::drift_offset;
pub use profile::{DensitySampler, RingProfile, sample_curve};
