//! Chunked streaming of procedurally generated ring particles
//!
//! Cells around each viewer are selected per octave, backed by pooled chunk
//! records, and filled a little every frame by rejection sampling.

pub mod coord;
pub mod chunk;
pub mod pool;
pub mod grid;
pub mod visibility;
pub mod spawn;
pub mod pipeline;

pub use coord::{ChunkCoord, ParticleCoord, UNSET_OCTAVE};
pub use chunk::{Chunk, ChunkId, ChunkState, Particle};
pub use pool::ChunkPool;
pub use grid::ChunkGrid;
pub use visibility::{LocalView, NEIGHBORHOOD_RADIUS, select_visible, visible_cells};
pub use spawn::{SpawnGrant, SpawnReport, plan_spawn, run_spawn};
pub use pipeline::{FieldState, FrameContext, FrameStats, run_frame, select_cells};

/// Octave limit; octave `k` cells are `2^k` times the base size
pub const MAX_OCTAVES: u8 = 8;

/// Cells in one octave's neighborhood (5×5×5)
pub const CELLS_PER_OCTAVE: u32 = 125;
